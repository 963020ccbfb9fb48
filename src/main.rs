use std::process;

fn main() {
    if let Err(err) = coheron::app::run() {
        eprintln!("fatal: {err:#}");
        process::exit(1);
    }
}
