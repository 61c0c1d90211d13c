use clap::Parser;

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)
"#;

#[derive(Debug, Parser)]
#[command(
    name = "kinpoints-server",
    version,
    about = "KinPoints server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {}
