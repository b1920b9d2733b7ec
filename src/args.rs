use clap::Parser;

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON config (created with defaults if missing)
    #[arg(long, default_value = AppConfig::DEFAULT_PATH)]
    pub config: String,

    /// Camera index, overrides the config
    #[arg(short, long)]
    pub cam_index: Option<u32>,

    /// Product catalog JSON, overrides the config
    #[arg(long)]
    pub catalog: Option<String>,

    /// Mirror the camera image horizontally
    #[arg(long, default_value_t = false)]
    pub mirror: bool,

    /// List available cameras
    #[arg(long)]
    pub list: bool,

    /// Run without a window; commands are read from stdin (start, restart, quit)
    #[arg(long)]
    pub headless: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["handcart"]);
        assert_eq!(args.config, "config.json");
        assert!(args.cam_index.is_none());
        assert!(!args.headless);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn overrides() {
        let args = Args::parse_from(["handcart", "-c", "2", "--catalog", "shop.json", "--headless", "--mirror"]);
        assert_eq!(args.cam_index, Some(2));
        assert_eq!(args.catalog.as_deref(), Some("shop.json"));
        assert!(args.headless);
        assert!(args.mirror);
    }
}
