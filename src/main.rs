fn main() {
    if let Err(err) = pitch_scheduler::run() {
        eprintln!("pitch-scheduler: {err}");
        std::process::exit(1);
    }
}
