pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod match_reader;

pub use config::EngineConfig;
pub use error::EngineError;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("match_splitter"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // try_init: repeated calls (tests, several scanners) are harmless
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    }
}
