use crate::cli::ConfigCommands;
use crate::config::{env_var_for, KNOWN_KEYS};
use crate::context::AppContext;
use crate::error::Result;
use crate::settings::{check_writable, config_get, config_list, config_set, config_unset};
use serde_json::json;

/// Keys whose values should be masked in output
fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower.contains("api_key") || lower.contains("secret")
}

/// Mask a sensitive value for display: show first 4 chars + ********
fn mask_value(value: &str) -> String {
    match value.char_indices().nth(4) {
        Some((cut, _)) => format!("{}...********", &value[..cut]),
        None => "********".to_string(),
    }
}

fn display_value(key: &str, value: &str) -> String {
    if is_sensitive_key(key) {
        mask_value(value)
    } else {
        value.to_string()
    }
}

/// Handle all `tasklens config` subcommands
pub async fn handle_config_command(ctx: &AppContext, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value, format } => handle_set(ctx, &key, &value, &format).await,
        ConfigCommands::Get { key, format } => handle_get(ctx, &key, &format).await,
        ConfigCommands::List { prefix, format } => {
            handle_list(ctx, prefix.as_deref(), &format).await
        },
        ConfigCommands::Unset { key, format } => handle_unset(ctx, &key, &format).await,
    }
}

async fn handle_set(ctx: &AppContext, key: &str, value: &str, format: &str) -> Result<()> {
    check_writable(key)?;
    config_set(&ctx.pool, key, value).await?;

    if !KNOWN_KEYS.contains(&key) {
        eprintln!("Note: '{}' is not a key tasklens reads", key);
    }
    if std::env::var(env_var_for(key)).is_ok() {
        eprintln!(
            "Note: {} is set and takes precedence over this value",
            env_var_for(key)
        );
    }

    let shown = display_value(key, value);
    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "value": shown,
                "set": true,
            }))?
        );
    } else {
        println!("Set {} = {}", key, shown);
    }

    Ok(())
}

async fn handle_get(ctx: &AppContext, key: &str, format: &str) -> Result<()> {
    let value = config_get(&ctx.pool, key).await?;
    let shown = value.as_deref().map(|v| display_value(key, v));

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "value": shown,
            }))?
        );
    } else {
        match shown {
            Some(v) => println!("{} = {}", key, v),
            None => println!("{}: (not set)", key),
        }
    }

    Ok(())
}

async fn handle_list(ctx: &AppContext, prefix: Option<&str>, format: &str) -> Result<()> {
    let entries = config_list(&ctx.pool, prefix).await?;

    if format == "json" {
        let items: Vec<serde_json::Value> = entries
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": display_value(k, v) }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "config": items }))?
        );
    } else if entries.is_empty() {
        println!("No configuration entries found.");
    } else {
        for (key, value) in &entries {
            println!("{} = {}", key, display_value(key, value));
        }
    }

    Ok(())
}

async fn handle_unset(ctx: &AppContext, key: &str, format: &str) -> Result<()> {
    check_writable(key)?;
    let deleted = config_unset(&ctx.pool, key).await?;

    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "key": key,
                "deleted": deleted,
            }))?
        );
    } else if deleted {
        println!("Unset {}", key);
    } else {
        println!("{}: (not found)", key);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sensitive_key() {
        assert!(is_sensitive_key("llm.api_key"));
        assert!(is_sensitive_key("LLM.API_KEY"));
        assert!(is_sensitive_key("some.secret"));
        assert!(!is_sensitive_key("llm.endpoint"));
        assert!(!is_sensitive_key("worker.concurrency"));
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(
            mask_value("sk-65595e731935451cbac9b29b48f0c906"),
            "sk-6...********"
        );
        assert_eq!(mask_value("abc"), "********");
        assert_eq!(mask_value("abcd"), "********");
        assert_eq!(mask_value("abcde"), "abcd...********");
    }
}
