//! Chained transforms: output of step n is input to step n+1

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::xml::Element;

use super::{Params, Transform};

/// A transform built from a sequence of steps, e.g. a primary mapping
/// followed by a marker-id uniquification pass.
#[derive(Default)]
pub struct ChainedTransform {
    steps: Vec<Arc<dyn Transform>>,
}

impl ChainedTransform {
    pub fn new() -> Self {
        ChainedTransform::default()
    }

    /// Append a step
    pub fn then<T: Transform + 'static>(mut self, step: T) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transform for ChainedTransform {
    fn apply(&self, input: &Element, params: &Params) -> Result<Element> {
        let mut current = input.clone();
        for (index, step) in self.steps.iter().enumerate() {
            current = step
                .apply(&current, params)
                .with_context(|| format!("chain step {}", index))?;
        }
        Ok(current)
    }

    fn last_modified(&self, params: &Params) -> DateTime<Utc> {
        self.steps
            .iter()
            .map(|step| step.last_modified(params))
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::FnTransform;
    use crate::xml::parse;
    use anyhow::bail;

    fn tag_appender(suffix: &'static str) -> FnTransform<impl Fn(&Element, &Params) -> Result<Element> + Send + Sync>
    {
        FnTransform::new(move |input: &Element, _params: &Params| {
            let mut output = input.clone();
            let tagged = match output.attr("tag") {
                Some(existing) => format!("{}{}", existing, suffix),
                None => suffix.to_string(),
            };
            output.set_attr("tag", tagged);
            Ok(output)
        })
    }

    #[test]
    fn test_steps_run_in_order() {
        let chain = ChainedTransform::new()
            .then(tag_appender("a"))
            .then(tag_appender("b"))
            .then(tag_appender("c"));

        let input = parse("<root/>").unwrap();
        let output = chain.apply(&input, &Params::new()).unwrap();
        assert_eq!(output.attr("tag"), Some("abc"));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = ChainedTransform::new();
        let input = parse(r#"<root a="1"/>"#).unwrap();
        assert_eq!(chain.apply(&input, &Params::new()).unwrap(), input);
    }

    #[test]
    fn test_failure_names_the_step() {
        let chain = ChainedTransform::new()
            .then(tag_appender("a"))
            .then(FnTransform::new(|_: &Element, _: &Params| {
                bail!("boom")
            }));

        let input = parse("<root/>").unwrap();
        let err = chain.apply(&input, &Params::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("chain step 1"));
    }

    #[test]
    fn test_last_modified_is_max_over_steps() {
        struct At(DateTime<Utc>);
        impl Transform for At {
            fn apply(&self, input: &Element, _params: &Params) -> Result<Element> {
                Ok(input.clone())
            }
            fn last_modified(&self, _params: &Params) -> DateTime<Utc> {
                self.0
            }
        }

        let older = Utc::now();
        let newer = older + chrono::Duration::seconds(60);
        let chain = ChainedTransform::new().then(At(newer)).then(At(older));
        assert_eq!(chain.last_modified(&Params::new()), newer);
    }
}
