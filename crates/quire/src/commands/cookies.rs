//! Cookie maintenance.

use anyhow::Result;

use super::Context;

/// Delete every cookie held by the session.
pub fn clear(ctx: &Context) -> Result<()> {
    let before = ctx.session.cookie_jar().len();
    ctx.session.remove_all_cookies();
    if ctx.json_output {
        println!("{}", serde_json::json!({ "removed": before }));
    } else {
        println!("Removed {} cookies", before);
    }
    Ok(())
}
