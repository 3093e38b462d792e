use std::path::PathBuf;

use client::{ClientError, ReportLocation};
use tokio::fs::File;

pub fn print_url(uri: &str, location: &ReportLocation) -> Result<(), ClientError> {
    let resource = location
        .url(uri)
        .ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))?;
    println!("{resource}");
    Ok(())
}

pub async fn download(
    uri: &str,
    location: &ReportLocation,
    token: Option<&String>,
    output: Option<&String>,
) -> Result<(), ClientError> {
    let resource = location
        .url(uri)
        .ok_or_else(|| ClientError::InvalidUri(uri.to_owned()))?;
    let output = output.map_or_else(|| default_output(&location.path), PathBuf::from);

    let mut file = File::create(&output).await?;
    let written = client::download_file(&resource, token.map(String::as_str), &mut file).await;
    match written {
        Ok(size) => {
            println!("file {} downloaded. Size: {size} bytes", output.display());
            Ok(())
        }
        Err(e) => {
            drop(file);
            tokio::fs::remove_file(&output).await.unwrap_or_default();
            Err(e)
        }
    }
}

fn default_output(path: &str) -> PathBuf {
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map_or_else(|| PathBuf::from("index.html"), PathBuf::from)
}
