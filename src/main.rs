use std::process::ExitCode;

use clap::Parser;
use objstore::{
    util::uri::{self, is_remote},
    ObjectStoreClient, StoreError,
};
use tracing::{error, info, span, Instrument, Level};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let span = span!(Level::INFO, "main", context = "main");
    async move {
        info!(endpoint = ?cli.endpoint, region = %cli.region, aws_env = cli.aws_env, "called");

        match run(cli).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error_message=%err, error_group="command");
                eprintln!("objstore: {}", err);
                ExitCode::FAILURE
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(cli: Cli) -> objstore::Result<()> {
    let client = if cli.aws_env {
        ObjectStoreClient::from_env(cli.endpoint.as_deref(), cli.secure).await?
    } else {
        ObjectStoreClient::new(&cli.connection_config())?
    };

    match cli.command {
        Command::Mb { bucket } => {
            let bucket = uri::parse_bucket(&bucket)?;
            client.create_bucket(&bucket).await?;
            println!("Bucket created successfully `{}`.", bucket);
        }
        Command::Rb { bucket } => {
            let bucket = uri::parse_bucket(&bucket)?;
            client.delete_bucket(&bucket).await?;
            println!("Removed `{}` successfully.", bucket);
        }
        Command::Ls { target: None, .. } => {
            for bucket in client.list_buckets().await? {
                println!("{}/", bucket);
            }
        }
        Command::Ls {
            target: Some(target),
            recursive,
        } => {
            let (bucket, prefix) = uri::parse_listing(&target)?;
            for entry in client
                .list_objects_with_prefix(&bucket, &prefix, recursive)
                .await?
            {
                println!("{}", cli::format_entry(&entry));
            }
        }
        Command::Cp { source, dest } => match (is_remote(&source), is_remote(&dest)) {
            (false, true) => {
                let object = uri::parse_object(&dest)?;
                client.upload_file(&object.bucket, &object.key, &source).await?;
                println!("`{}` -> `{}`", source, dest);
            }
            (true, false) => {
                let object = uri::parse_object(&source)?;
                let written = client
                    .download_file(&object.bucket, &object.key, &dest)
                    .await?;
                println!("`{}` -> `{}` ({} bytes)", source, dest, written);
            }
            _ => {
                return Err(StoreError::InvalidArgument(
                    "cp needs exactly one s3:// argument".to_string(),
                ))
            }
        },
        Command::Rm { target } => {
            let object = uri::parse_object(&target)?;
            client.delete_object(&object.bucket, &object.key).await?;
            println!("Removed `{}`.", target);
        }
        Command::Mv { source, dest } => {
            let from = uri::parse_object(&source)?;
            let to = uri::parse_object(&dest)?;
            if from.bucket != to.bucket {
                return Err(StoreError::InvalidArgument(format!(
                    "mv stays within one bucket, got `{}` and `{}`",
                    from.bucket, to.bucket
                )));
            }

            client.rename_object(&from.bucket, &from.key, &to.key).await?;
            println!("`{}` -> `{}`", source, dest);
        }
        Command::Share { target, expire } => {
            let object = uri::parse_object(&target)?;
            let url = client
                .generate_presigned_url(&object.bucket, &object.key, expire)
                .await?;
            println!("{}", url);
        }
    }

    Ok(())
}
