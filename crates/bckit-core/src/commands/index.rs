use anyhow::Result;
use bckit_domain::Layout;
use serde_json::json;

use super::index_missing;
use crate::validate::check_index;
use crate::{CommandContext, ExecutionOutcome};

#[derive(Clone, Debug)]
pub struct IndexCheckRequest {
    pub mirror: String,
    pub layout: Layout,
    pub force: bool,
}

pub fn index_check(ctx: &CommandContext, request: IndexCheckRequest) -> Result<ExecutionOutcome> {
    let engine = match ctx.engine(&request.mirror) {
        Ok(engine) => engine,
        Err(outcome) => return Ok(outcome),
    };
    let document = match engine.index(request.layout) {
        Ok(document) => document,
        Err(err) => {
            return match index_missing(&err, engine.mirror().as_str()) {
                Some(outcome) => Ok(outcome),
                None => Err(err),
            }
        }
    };
    let catalog = engine.catalog(request.layout, &[], request.force)?;
    let check = check_index(catalog.root(), &document.index);
    let details = json!({
        "mirror": engine.mirror().as_str(),
        "index": document.object.key,
        "indexed": document.index.len(),
        "missing_from_mirror": check.missing_from_mirror,
        "missing_from_index": check.missing_from_index,
    });
    if check.is_consistent() {
        Ok(ExecutionOutcome::success(
            "index matches the mirror",
            details,
        ))
    } else {
        Ok(ExecutionOutcome::failure(
            format!(
                "index is out of date: {} registered specs missing, {} specs unregistered",
                check.missing_from_mirror.len(),
                check.missing_from_index.len()
            ),
            details,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use crate::testing::{hash, MirrorFixture};
    use crate::{CommandStatus, GlobalOptions};
    use time::OffsetDateTime;

    #[test]
    fn stale_index_fails_the_check() -> Result<()> {
        let fixture = MirrorFixture::new();
        let now = OffsetDateTime::now_utc();
        let present = fixture.add_v2_spec(None, "zlib", &hash(1), now);
        let gone = hash(2);
        fixture.write_index(None, &[(&present.hash, true), (&gone, true)], now);

        let global = GlobalOptions::default();
        let ctx = context(&global, &fixture);
        let outcome = index_check(
            &ctx,
            IndexCheckRequest {
                mirror: fixture.root().display().to_string(),
                layout: Layout::V2,
                force: false,
            },
        )?;
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["missing_from_mirror"][0], gone.as_str());
        assert_eq!(outcome.details["missing_from_index"].as_array().map(Vec::len), Some(0));
        Ok(())
    }
}
