fn main() {
    std::process::exit(activity_tracker_lib::run())
}
