//! Variable reference path grammar (spec §4.2): `segment ( "." segment )*`
//! where a segment is `name` or `name[index]`.

use crate::error::{ErrorKind, Result};
use crate::model::{ParameterMap, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub name: String,
    pub index: Option<usize>,
}

pub fn parse(path: &str) -> Result<Vec<Segment>> {
    path.split('.').map(|s| parse_segment(path, s)).collect()
}

fn parse_segment(full_path: &str, seg: &str) -> Result<Segment> {
    match seg.find('[') {
        Some(idx) => {
            if !seg.ends_with(']') {
                return Err(ErrorKind::UndefinedVariable(full_path.to_string()).into());
            }
            let name = seg[..idx].to_string();
            let index_str = &seg[idx + 1..seg.len() - 1];
            let index: usize = index_str
                .parse()
                .map_err(|_| ErrorKind::UndefinedVariable(full_path.to_string()))?;
            Ok(Segment { name, index: Some(index) })
        }
        None => Ok(Segment { name: seg.to_string(), index: None }),
    }
}

/// Navigate `root` following `segments`, returning the raw (unresolved)
/// value at that path, or `None` if any segment does not exist.
pub fn navigate(root: &ParameterMap, segments: &[Segment]) -> Option<Value> {
    let mut iter = segments.iter();
    let first = iter.next()?;
    let mut current = root.get(&first.name)?.clone();
    if let Some(i) = first.index {
        current = current.as_list()?.get(i)?.clone();
    }
    for seg in iter {
        let map = current.as_map()?;
        current = map.get(&seg.name)?.clone();
        if let Some(i) = seg.index {
            current = current.as_list()?.get(i)?.clone();
        }
    }
    Some(current)
}

/// Canonical normalized form of a path, used as the cache/cycle key.
pub fn normalize(path: &str) -> String {
    path.to_string()
}
