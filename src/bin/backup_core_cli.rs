use backup_core::{
    cli::{report, run_cli},
    init,
};

fn main() {
    init();

    if let Err(err) = run_cli() {
        report(&err);
        std::process::exit(1);
    }
}
