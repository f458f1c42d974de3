//! Stands in for the `torero` binary; see `torero_dashboard::capture`.

use torero_dashboard::capture;
use torero_dashboard::config::CaptureConfig;

fn main() {
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();
    let config = CaptureConfig::from_env();

    let code = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) if std::env::var_os(capture::REPORTER_ENV).is_some() => {
            runtime.block_on(capture::report_from_stdin(&config))
        }
        Ok(runtime) => runtime.block_on(capture::run(&config, args)),
        Err(e) => {
            eprintln!("torero-capture: failed to start runtime: {}", e);
            127
        }
    };

    std::process::exit(code);
}
