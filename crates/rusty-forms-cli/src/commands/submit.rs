use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rusty_forms::{ClaimSession, ErrorMap, SubmitState, Value, Witness};
use std::path::Path;

use crate::Edits;

pub async fn validate(config: &Path, edits: &Edits) -> Result<()> {
    let mut session = start(config, edits).await?;

    let form = session.form_mut();
    form.validate_all();
    form.settle().await;

    let errors = form.errors();
    if errors.is_empty() {
        println!("{}", "✓ Claim is valid".green().bold());
    } else {
        print_errors(&errors);
    }
    Ok(())
}

pub async fn execute(config: &Path, edits: &Edits) -> Result<()> {
    let mut session = start(config, edits).await?;

    let (state, record) = session.submit().await?;
    match (state, record) {
        (SubmitState::Accepted, Some(record)) => {
            eprintln!("{}", "✓ Claim accepted".green().bold());
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        (state, _) => {
            eprintln!("{} ({})", "✗ Claim not submitted".red().bold(), state);
            print_errors(&session.form().errors());
            Err(anyhow!("submission {}", state))
        }
    }
}

async fn start(config: &Path, edits: &Edits) -> Result<ClaimSession> {
    let (config, lookup) = super::load(config)?;
    let mut session = ClaimSession::start(&config, lookup).await?;
    apply(&mut session, edits)?;
    Ok(session)
}

fn apply(session: &mut ClaimSession, edits: &Edits) -> Result<()> {
    for raw in &edits.sets {
        let (path, value) = parse_set(raw)?;
        session
            .form_mut()
            .set(path, value)
            .with_context(|| format!("Failed to set {path}"))?;
    }

    for part in &edits.toggle_parts {
        session.toggle_damaged_part(part)?;
    }

    for raw in &edits.add_witnesses {
        session.add_witness(parse_witness(raw)?)?;
    }

    for &index in &edits.remove_witnesses {
        session
            .remove_witness(index)
            .with_context(|| format!("Failed to remove witness {index}"))?;
    }

    tracing::debug!("Applied edits: {:?}", edits);
    Ok(())
}

/// `path=value`; the value is JSON if it parses as JSON, otherwise plain text
fn parse_set(raw: &str) -> Result<(&str, Value)> {
    let (path, text) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected PATH=VALUE, got {raw:?}"))?;
    let value = serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(text));
    Ok((path.trim(), value))
}

fn parse_witness(raw: &str) -> Result<Witness> {
    let (name, email) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("Expected NAME,EMAIL, got {raw:?}"))?;
    Ok(Witness::new(name.trim(), email.trim()))
}

fn print_errors(errors: &ErrorMap) {
    for (path, error) in errors.iter() {
        println!("  {} {}", format!("{path}:").yellow(), error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_json_and_text() {
        assert_eq!(parse_set("amount=120").unwrap(), ("amount", Value::Number(120.0)));
        assert_eq!(
            parse_set("witnesses[0].email=a@b.cz").unwrap(),
            ("witnesses[0].email", Value::from("a@b.cz"))
        );
        assert_eq!(parse_set("category=\"groceries\"").unwrap().1, Value::from("groceries"));
        assert_eq!(parse_set("allocation=").unwrap().1, Value::from(""));
        assert!(parse_set("amount").is_err());
    }

    #[test]
    fn test_parse_witness() {
        assert_eq!(
            parse_witness("Jana, jana@example.com").unwrap(),
            Witness::new("Jana", "jana@example.com")
        );
        assert!(parse_witness("Jana").is_err());
    }
}
