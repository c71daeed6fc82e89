//! rbtc node entrypoint.

fn main() {
    if let Err(error) = rbtc::cli::run() {
        eprintln!("Error: {error:?}");
        std::process::exit(1);
    }
}
