fn main() -> std::process::ExitCode {
    pool_admin_lib::run()
}
