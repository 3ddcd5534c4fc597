/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Named-template resolution for the apply commands.

use std::collections::HashMap;

use sxd_document::dom::Element;
use tracing::trace;

use crate::error::TemplateResult;
use crate::parser::Template;

/// A catalog of supporting templates, resolved by name at execution
/// time. Application of a name the catalog does not hold is a no-op.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, Template>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, template: Template) {
        self.templates.insert(name.into(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Build a catalog from an XML element whose children each carry a
    /// `name` attribute and a template as their inner markup. Children
    /// without a name are skipped. Each child honors its own
    /// configuration attributes.
    pub fn from_element(element: Element<'_>) -> TemplateResult<Self> {
        let mut catalog = Self::new();
        for child in element.children() {
            let Some(child) = child.element() else {
                continue;
            };
            let Some(name) = child.attribute_value("name") else {
                trace!("skipping unnamed supporting template");
                continue;
            };
            catalog.insert(name, Template::from_element(child)?);
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sxd_document::parser;

    use super::*;

    #[test]
    fn test_from_element_indexes_named_children() {
        let package = parser::parse(
            r#"<templates>
                 <template name="row">cell</template>
                 <anonymous>skipped</anonymous>
                 <t name="other" delim-start="[%" delim-end="%]">x</t>
               </templates>"#,
        )
        .unwrap();
        let doc = package.as_document();
        let root = doc.root().children()[0].element().unwrap();
        let catalog = TemplateCatalog::from_element(root).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("row").unwrap().source(), "cell");
        assert_eq!(
            catalog.get("other").unwrap().options().delimiter_start,
            "[%"
        );
        assert!(catalog.get("anonymous").is_none());
    }
}
