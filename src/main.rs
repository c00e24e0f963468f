fn main() -> std::process::ExitCode {
    jarloom_lib::run()
}
