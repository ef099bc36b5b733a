use std::io::{self, BufRead, Write};

pub fn write_frame<W>(out: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: Write,
{
    out.write_all(frame)?;
    out.flush()?;
    Ok(())
}

/// Read one newline terminated frame, delimiter included.
///
/// Keeps reading until the delimiter shows up, so a reply split over many
/// socket reads comes back whole. Bytes past the delimiter stay buffered in
/// `inp` for the next frame.
pub fn read_frame<R>(inp: &mut R) -> io::Result<Vec<u8>>
where
    R: BufRead,
{
    let mut buf = Vec::new();
    let n = inp.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        ));
    }
    if buf.last() != Some(&b'\n') {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed in the middle of a frame",
        ));
    }
    Ok(buf)
}
