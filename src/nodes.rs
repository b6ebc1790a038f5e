//! `lrag node` commands.

use anyhow::{bail, Result};

use legal_rag_core::models::KnowledgeNode;
use legal_rag_core::store::Store;

use crate::app::App;
use crate::config::Config;

/// Look a node up by id, then by name.
pub async fn resolve_node(store: &dyn Store, key: &str) -> Result<KnowledgeNode> {
    if let Some(node) = store.get_node(key).await? {
        return Ok(node);
    }
    match store.list_nodes().await?.into_iter().find(|n| n.name == key) {
        Some(node) => Ok(node),
        None => bail!("Knowledge node not found: {}", key),
    }
}

pub async fn run_create(config: &Config, name: &str, description: Option<&str>) -> Result<()> {
    let app = App::connect(config).await?;
    let node = app.store.create_node(name, description).await?;
    println!("{}", node.id);
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let app = App::connect(config).await?;
    let nodes = app.store.list_nodes().await?;

    if nodes.is_empty() {
        println!("No knowledge nodes. Create one with `lrag node create <name>`.");
        return Ok(());
    }

    println!("{:<38} {:<24} DESCRIPTION", "ID", "NAME");
    for node in nodes {
        println!(
            "{:<38} {:<24} {}",
            node.id,
            node.name,
            node.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_delete(config: &Config, key: &str) -> Result<()> {
    let app = App::connect(config).await?;
    let node = resolve_node(app.store.as_ref(), key).await?;
    app.store.delete_node(&node.id).await?;
    tracing::info!(node_id = %node.id, name = %node.name, "node deleted");
    println!("deleted {} ({})", node.name, node.id);
    Ok(())
}
