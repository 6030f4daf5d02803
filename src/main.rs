//! rbackup: copy one remote directory over SFTP into `<localdir>/<YYYY-MM-DD>/`.

fn main() {
    if let Err(exit_code) = rbackup::run() {
        std::process::exit(exit_code);
    }
}
