use anyhow::{Context, Result};
use futures::{pin_mut, StreamExt};
use quarry::query::QueryState;
use quarry::Client;
use std::path::Path;

/// Load a YAML or JSON query description
pub fn load_query(path: &Path) -> Result<QueryState> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query file {}", path.display()))?;
    QueryState::from_yaml(&source)
        .with_context(|| format!("Failed to parse query file {}", path.display()))
}

/// Print the search request a query file compiles to
pub fn run_compile(client: &Client, path: &Path) -> Result<()> {
    let state = load_query(path)?;
    let request = client.compiler().compile_select(&state)?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

/// Run a query file and print matching documents as JSONL
pub async fn run_search(client: &Client, path: &Path, all: bool) -> Result<()> {
    let mut query = client.query_state(load_query(path)?);

    if all {
        let stream = query.cursor();
        pin_mut!(stream);
        let mut count = 0usize;
        while let Some(document) = stream.next().await {
            println!("{}", serde_json::to_string(&document?)?);
            count += 1;
        }
        tracing::info!(count, "scroll finished");
        return Ok(());
    }

    let documents = query.get().await?;
    for document in &documents {
        println!("{}", serde_json::to_string(document)?);
    }
    let total = query.count_for_pagination().await?;
    let took = query.search_duration().await?;
    eprintln!(
        "{} of {} documents ({} ms)",
        documents.len(),
        total,
        took.map(|t| t.to_string()).unwrap_or_else(|| "?".to_string())
    );
    Ok(())
}

/// Fetch a single document by id
pub async fn run_get(client: &Client, collection: &str, id: &str) -> Result<()> {
    match client.query(collection).document(id).await? {
        Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
        None => anyhow::bail!("Document '{}' not found in '{}'", id, collection),
    }
    Ok(())
}

/// Delete everything matching a query file
pub async fn run_delete(
    client: &Client,
    path: &Path,
    conflicts: Option<&str>,
    refresh: Option<&str>,
) -> Result<()> {
    let mut query = client.query_state(load_query(path)?);
    if let Some(conflicts) = conflicts {
        query.on_conflicts(conflicts)?;
    }
    if let Some(refresh) = refresh {
        query.with_refresh(refresh)?;
    }

    let deleted = query.delete().await?;
    println!("{}", if deleted { "Documents deleted" } else { "Nothing deleted" });
    Ok(())
}
