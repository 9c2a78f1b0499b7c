#![forbid(unsafe_code)]

fn main() {
    if let Err(error) = embed_cli::run_from_env() {
        eprintln!("embedctl: {error}");
        std::process::exit(error.exit_code());
    }
}
