//! Structural normalization of daemon replies.
//!
//! Status replies arrive as `[code, [(label, value), ...]]`, with values that
//! may themselves be pair lists (the `Filter` and `Actions` sections of a
//! jail status). [`normalize`] strips the status-code envelope and turns pair
//! lists into [`Mapping`]s, so the parsers can look fields up by label.

use crate::reply::{Mapping, RawReply};

/// Turn a reply into a label mapping, or `None` when it has no such shape.
///
/// * Any two-element sequence whose second element is a sequence is an
///   envelope and is unwrapped to that element, whatever the first one is.
/// * A non-empty sequence of two-element sequences becomes a mapping; keys
///   are stringified, values are converted the same way, and a repeated key
///   keeps its last value.
/// * A mapping is taken as is, with its values converted.
pub fn normalize(reply: &RawReply) -> Option<Mapping> {
    let body = match reply {
        RawReply::Sequence(items) => match items.as_slice() {
            [_, inner @ RawReply::Sequence(_)] => inner,
            _ => reply,
        },
        _ => reply,
    };

    match body {
        RawReply::Mapping(mapping) => Some(convert_mapping(mapping)),
        RawReply::Sequence(items) => pairs_to_mapping(items),
        RawReply::Scalar(_) | RawReply::Text(_) => None,
    }
}

fn pairs_to_mapping(items: &[RawReply]) -> Option<Mapping> {
    if items.is_empty() {
        return None;
    }
    let mut mapping = Mapping::new();
    for item in items {
        let [key, value] = item.as_sequence()? else {
            return None;
        };
        mapping.insert(key.to_string(), convert(value));
    }
    Some(mapping)
}

fn convert_mapping(mapping: &Mapping) -> Mapping {
    mapping
        .iter()
        .map(|(key, value)| (key, convert(value)))
        .collect()
}

fn convert(value: &RawReply) -> RawReply {
    match value {
        RawReply::Sequence(items) => match pairs_to_mapping(items) {
            Some(mapping) => RawReply::Mapping(mapping),
            None => value.clone(),
        },
        RawReply::Mapping(mapping) => RawReply::Mapping(convert_mapping(mapping)),
        RawReply::Scalar(_) | RawReply::Text(_) => value.clone(),
    }
}
