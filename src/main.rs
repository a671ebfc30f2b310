use jieqi_uci::console;

fn main() {
    if let Err(e) = console::run() {
        eprintln!("console error: {e}");
        std::process::exit(1);
    }
}
