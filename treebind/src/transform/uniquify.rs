//! Marker-id uniquification pass
//!
//! Chained after a primary mapping when the same fragment is inserted
//! more than once: every marker id gains the caller-supplied `suffix`
//! parameter, so repeated insertions cannot collide. The suffix must
//! come in as a parameter; the pass has to stay referentially
//! transparent for identical inputs.

use anyhow::{Result, bail};

use crate::xml::{DEFAULT_MARKER_ATTR, Element};

use super::{Params, Transform};

/// Name of the parameter carrying the per-insertion suffix
pub const SUFFIX_PARAM: &str = "suffix";

/// Rewrites every marker id to `<id>.<suffix>`
pub struct UniquifyIds {
    attr: String,
}

impl UniquifyIds {
    pub fn new() -> Self {
        UniquifyIds {
            attr: DEFAULT_MARKER_ATTR.to_string(),
        }
    }

    pub fn with_attr(attr: impl Into<String>) -> Self {
        UniquifyIds { attr: attr.into() }
    }
}

impl Default for UniquifyIds {
    fn default() -> Self {
        UniquifyIds::new()
    }
}

impl Transform for UniquifyIds {
    fn apply(&self, input: &Element, params: &Params) -> Result<Element> {
        let Some(suffix) = params.get(SUFFIX_PARAM) else {
            bail!("uniquify requires a '{}' parameter", SUFFIX_PARAM);
        };

        let mut output = input.clone();
        output.walk_mut(&mut |element| {
            if let Some(id) = element.attr(&self.attr).map(str::to_owned) {
                element.set_attr(&self.attr, format!("{}.{}", id, suffix));
            }
        });
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn test_rewrites_every_marker_id() {
        let input =
            parse(r#"<root marker="top"><a marker="x1"/><b><c marker="x2"/></b><d/></root>"#)
                .unwrap();
        let params = Params::new().set(SUFFIX_PARAM, "7");

        let output = UniquifyIds::new().apply(&input, &params).unwrap();

        assert_eq!(output.attr("marker"), Some("top.7"));
        let a = output.element_at(&[0]).unwrap();
        assert_eq!(a.attr("marker"), Some("x1.7"));
        let c = output.element_at(&[1, 0]).unwrap();
        assert_eq!(c.attr("marker"), Some("x2.7"));
        let d = output.element_at(&[2]).unwrap();
        assert_eq!(d.attr("marker"), None);
    }

    #[test]
    fn test_missing_suffix_errors() {
        let input = parse(r#"<root marker="x1"/>"#).unwrap();
        let err = UniquifyIds::new().apply(&input, &Params::new()).unwrap_err();
        assert!(err.to_string().contains("suffix"));
    }

    #[test]
    fn test_custom_attribute() {
        let input = parse(r#"<root bind="x1"><a marker="left-alone"/></root>"#).unwrap();
        let params = Params::new().set(SUFFIX_PARAM, "2");

        let output = UniquifyIds::with_attr("bind").apply(&input, &params).unwrap();

        assert_eq!(output.attr("bind"), Some("x1.2"));
        let a = output.element_at(&[0]).unwrap();
        assert_eq!(a.attr("marker"), Some("left-alone"));
    }

    #[test]
    fn test_distinct_suffixes_keep_fragments_apart() {
        let input = parse(r#"<fragment marker="row"/>"#).unwrap();
        let first = UniquifyIds::new()
            .apply(&input, &Params::new().set(SUFFIX_PARAM, "1"))
            .unwrap();
        let second = UniquifyIds::new()
            .apply(&input, &Params::new().set(SUFFIX_PARAM, "2"))
            .unwrap();

        assert_ne!(first.attr("marker"), second.attr("marker"));
    }
}
