use scribe_app::app;

pub fn main() {
    app::launch();
}
