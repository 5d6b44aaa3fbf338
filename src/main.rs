use std::env;
use std::process;

fn main() {
    bossraid::logging::init();
    let args: Vec<String> = env::args().collect();
    process::exit(bossraid::cli::run_with_args(&args));
}
