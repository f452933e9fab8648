use anyhow::Result;

use crate::extract::{DocumentSource, extract};

pub async fn run(source: &str) -> Result<()> {
    let source = DocumentSource::parse(source).await?;
    let text = extract(&source).await?;
    println!("{}", text);
    Ok(())
}
