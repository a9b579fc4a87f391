use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Logging setup for the overlay binary.
///
/// Defaults to info; relay dispatch is chatty at debug, so turn it on per
/// module when tracing a query, e.g.
/// `RUST_LOG=bloomshare::core::routing=debug`.
pub fn setup_logging() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                chrono::Utc::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
