use clap::{builder::BoolishValueParser, ArgAction, Parser, Subcommand};
use objstore::{model::config::DEFAULT_REGION, ConnectionConfig, ObjectEntry};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Parser)]
#[command(name = "objstore", version, about = "Bucket and object commands for S3-compatible stores")]
pub struct Cli {
    /// Endpoint, `host:port` or a full http(s) URL [default: localhost:9000]
    #[arg(long, env = "MINIO_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    #[arg(long, env = "MINIO_ACCESS_KEY", default_value = "minioadmin", global = true)]
    pub access_key: String,

    #[arg(
        long,
        env = "MINIO_SECRET_KEY",
        default_value = "minioadmin",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub secret_key: String,

    #[arg(long, env = "MINIO_REGION", default_value = DEFAULT_REGION, global = true)]
    pub region: String,

    /// Use https for bare `host:port` endpoints
    #[arg(
        long,
        env = "MINIO_SECURE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub secure: bool,

    /// Address buckets as `bucket.host` instead of `host/bucket`
    #[arg(long, global = true)]
    pub virtual_host: bool,

    /// Take credentials and region from the AWS environment and profile
    /// chain instead of the key options; without --endpoint this talks to AWS
    #[arg(long, global = true)]
    pub aws_env: bool,

    #[command(subcommand)]
    pub command: Command,
}

pub const DEFAULT_ENDPOINT: &str = "localhost:9000";

impl Cli {
    pub fn connection_config(&self) -> ConnectionConfig {
        let endpoint = self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

        ConnectionConfig::new(endpoint, &self.access_key, &self.secret_key)
            .with_region(&self.region)
            .with_secure(self.secure)
            .with_path_style(!self.virtual_host)
    }
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Create a bucket; succeeds if you already own it
    Mb { bucket: String },

    /// Remove a bucket together with every object in it
    Rb { bucket: String },

    /// List buckets, or the objects under s3://bucket[/prefix]
    Ls {
        target: Option<String>,

        #[arg(short, long)]
        recursive: bool,
    },

    /// Upload a local file to s3://bucket/key, or download one back
    Cp { source: String, dest: String },

    /// Remove s3://bucket/key
    Rm { target: String },

    /// Rename s3://bucket/old to s3://bucket/new (copy, then delete)
    Mv { source: String, dest: String },

    /// Print a presigned GET URL for s3://bucket/key
    Share {
        target: String,

        /// Validity in seconds
        #[arg(long, default_value_t = 3600, allow_negative_numbers = true)]
        expire: i64,
    },
}

pub fn format_entry(entry: &ObjectEntry) -> String {
    if entry.is_prefix {
        return format!("{:>25} {:>12} {}", "", "PRE", entry.key);
    }

    let modified = entry
        .last_modified
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default();

    format!("{:>25} {:>12} {}", modified, entry.size, entry.key)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use time::OffsetDateTime;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        let cases = vec![
            (vec!["objstore", "mb", "t1"], Command::Mb { bucket: "t1".to_string() }),
            (vec!["objstore", "rb", "s3://t1"], Command::Rb { bucket: "s3://t1".to_string() }),
            (vec!["objstore", "ls"], Command::Ls { target: None, recursive: false }),
            (
                vec!["objstore", "ls", "-r", "s3://t1/dir/"],
                Command::Ls { target: Some("s3://t1/dir/".to_string()), recursive: true },
            ),
            (
                vec!["objstore", "cp", "hello.txt", "s3://t1/hello.txt"],
                Command::Cp {
                    source: "hello.txt".to_string(),
                    dest: "s3://t1/hello.txt".to_string(),
                },
            ),
            (
                vec!["objstore", "share", "s3://t1/hello.txt"],
                Command::Share { target: "s3://t1/hello.txt".to_string(), expire: 3600 },
            ),
            (
                vec!["objstore", "share", "--expire", "-1", "s3://t1/hello.txt"],
                Command::Share { target: "s3://t1/hello.txt".to_string(), expire: -1 },
            ),
        ];

        for (args, expected) in cases {
            let cli = Cli::try_parse_from(args.clone()).unwrap();
            assert_eq!(cli.command, expected, "failed for case: {:?}", args);
        }
    }

    #[test]
    fn test_connection_flags() {
        let cli = Cli::try_parse_from([
            "objstore",
            "--endpoint",
            "s3.local:9000",
            "--secure",
            "--virtual-host",
            "ls",
        ])
        .unwrap();

        let config = cli.connection_config();
        assert_eq!(config.endpoint_url().unwrap(), "https://s3.local:9000");
        assert!(!config.path_style);
        assert!(!cli.aws_env);
    }

    #[test]
    fn test_secure_from_env() {
        let cases = vec![
            ("true", true),
            ("1", true),
            ("yes", true),
            ("on", true),
            ("false", false),
            ("0", false),
            ("no", false),
        ];

        for (value, expected) in cases {
            std::env::set_var("MINIO_SECURE", value);
            let cli = Cli::try_parse_from(["objstore", "ls"]);
            std::env::remove_var("MINIO_SECURE");

            assert_eq!(cli.unwrap().secure, expected, "failed for case: {}", value);
        }
    }

    #[test]
    fn test_format_entry() {
        let mut object = ObjectEntry::object("dir/k.txt", 42);
        object.last_modified = OffsetDateTime::from_unix_timestamp(0).ok();

        let line = format_entry(&object);
        assert!(line.ends_with(" 42 dir/k.txt"), "unexpected line: {}", line);
        assert!(line.contains("1970-01-01T00:00:00Z"), "unexpected line: {}", line);

        let prefix = format_entry(&ObjectEntry::prefix("dir/"));
        assert!(prefix.ends_with("PRE dir/"), "unexpected line: {}", prefix);
    }
}
