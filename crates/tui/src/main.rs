fn main() {
    if let Err(e) = chtop_tui::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
