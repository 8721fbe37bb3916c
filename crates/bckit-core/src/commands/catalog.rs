use anyhow::Result;
use bckit_domain::{complete_count, Layout, SpecMap};
use serde_json::{json, Value};

use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct CatalogRequest {
    pub mirror: String,
    pub layout: Layout,
    pub exclude: Vec<String>,
    pub force: bool,
}

pub fn catalog_summary(ctx: &CommandContext, request: CatalogRequest) -> Result<ExecutionOutcome> {
    let engine = match ctx.engine(&request.mirror) {
        Ok(engine) => engine,
        Err(outcome) => return Ok(outcome),
    };
    let catalog = engine.catalog(request.layout, &request.exclude, request.force)?;
    let root = counts(catalog.root());
    let stacks: Vec<Value> = catalog
        .stacks()
        .map(|(name, specs)| {
            let mut entry = counts(specs);
            entry["name"] = json!(name);
            entry
        })
        .collect();
    let complete = root["complete"].as_u64().unwrap_or_default();
    let message = format!(
        "{} complete specs in the root mirror, {} stacks",
        complete,
        stacks.len()
    );
    Ok(ExecutionOutcome::success(
        message,
        json!({
            "mirror": engine.mirror().as_str(),
            "layout": request.layout,
            "root": root,
            "stacks": stacks,
            "public_keys": catalog.public_keys().len(),
            "excluded": request.exclude,
        }),
    ))
}

fn counts(specs: &SpecMap) -> Value {
    let complete = complete_count(specs);
    json!({
        "total": specs.len(),
        "complete": complete,
        "incomplete": specs.len() - complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testing::{hash, MirrorFixture};
    use crate::{CommandStatus, GlobalOptions};
    use time::OffsetDateTime;

    #[test]
    fn summarises_root_and_stacks() -> Result<()> {
        let fixture = MirrorFixture::new();
        let now = OffsetDateTime::now_utc();
        fixture.add_v2_spec(None, "zlib", &hash(1), now);
        fixture.add_v2_spec(Some("e4s"), "zlib", &hash(1), now);
        let partial = fixture.add_v2_spec(Some("e4s"), "cmake", &hash(2), now);
        std::fs::remove_file(fixture.root().join(&partial.meta_key))?;
        fixture.add_v2_spec(Some("radiuss"), "hdf5", &hash(3), now);

        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture);
        let outcome = catalog_summary(
            &ctx,
            CatalogRequest {
                mirror: fixture.root().display().to_string(),
                layout: Layout::V2,
                exclude: vec!["radiuss".into()],
                force: false,
            },
        )?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["root"]["complete"], 1);
        let stacks = outcome.details["stacks"].as_array().unwrap();
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0]["name"], "e4s");
        assert_eq!(stacks[0]["incomplete"], 1);
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_user_error() -> Result<()> {
        let fixture = MirrorFixture::new();
        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture);
        let outcome = catalog_summary(
            &ctx,
            CatalogRequest {
                mirror: fixture.root().join("nope").display().to_string(),
                layout: Layout::V2,
                exclude: Vec::new(),
                force: false,
            },
        )?;
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "mirror_unavailable");
        Ok(())
    }
}
