fn main() {
    if let Err(e) = reelscore::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
