//! Turning matched nodes into output records

use std::collections::BTreeMap;

use crate::links::{absolutize, LINK_ATTRIBUTES};
use crate::tree::Node;

use super::stage::CombinedStage;

/// Key/value record produced from one matched node
pub type OutputRecord = BTreeMap<String, String>;

/// Build the output record for one match.
///
/// Attributes are copied under their remapped keys, then a `link` resolved
/// against `page_origin` and the node `text` are added when non-empty.
/// Stages flagged `skip_remap` always yield an empty record.
pub fn remap(node: &Node, stage: &CombinedStage, page_origin: &str) -> OutputRecord {
    let mut record = OutputRecord::new();
    if stage.skip_remap {
        return record;
    }

    for (key, value) in node.attributes() {
        record.insert(stage.remap_key(key).to_string(), value.clone());
    }

    let link = match absolutize(page_origin, LINK_ATTRIBUTES, node.attributes()) {
        Ok(link) => link,
        Err(e) => {
            tracing::debug!(error = %e, "skipping link for record");
            String::new()
        }
    };
    insert_if_present(&mut record, stage, "link", link);
    insert_if_present(&mut record, stage, "text", node.text().to_string());

    record
}

fn insert_if_present(record: &mut OutputRecord, stage: &CombinedStage, key: &str, value: String) {
    if value.is_empty() {
        return;
    }
    record.insert(stage.remap_key(key).to_string(), value);
}
