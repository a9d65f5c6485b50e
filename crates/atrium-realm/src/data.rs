//! The per-storage-class account payload.

use atrium_types::xml::Element;
use atrium_types::Properties;

use crate::error::{RealmError, Result};

/// One storage class's validated slice of an account's properties, as
/// persisted to `accounts/<id>/AccountData.xml`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountData {
    values: Properties,
}

impl AccountData {
    /// Wrap already-validated property values.
    pub(crate) fn new(values: Properties) -> Self {
        Self { values }
    }

    /// The property values in this payload.
    pub fn values(&self) -> &Properties {
        &self.values
    }

    /// `true` iff the payload carries at least one value.
    ///
    /// An empty payload is never written; the account simply has no file in
    /// that storage class.
    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Serialize as a standalone payload document:
    ///
    /// ```xml
    /// <AccountData>
    ///    <Property name="User">alice</Property>
    /// </AccountData>
    /// ```
    pub fn to_document(&self) -> String {
        let mut root = Element::new("AccountData");
        for (name, value) in self.values.iter() {
            root = root.with_child(
                Element::new("Property")
                    .with_attr("name", name)
                    .with_text(value),
            );
        }
        root.to_document()
    }

    /// Parse a payload document.
    pub fn parse_xml(xml: &Element) -> Result<Self> {
        if xml.name() != "AccountData" {
            return Err(RealmError::Config(format!(
                "expected an <AccountData/> document, got <{}/>",
                xml.name()
            )));
        }
        let mut values = Properties::new();
        for prop in xml.children_named("Property") {
            let name = prop.attr("name").ok_or_else(|| {
                RealmError::Config("<Property/> element without \"name\" attribute".to_string())
            })?;
            values.set(name, prop.text());
        }
        Ok(Self { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trip() {
        let data = AccountData::new(Properties::from([("User", "alice"), ("Mail", "a@b.example")]));
        let doc = data.to_document();
        assert!(doc.contains("<Property name=\"User\">alice</Property>"));

        let parsed = AccountData::parse_xml(&Element::parse(&doc).unwrap()).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn empty_payload_has_no_values() {
        assert!(!AccountData::default().has_values());
        assert!(AccountData::new(Properties::from([("a", "1")])).has_values());
    }

    #[test]
    fn parse_rejects_other_documents() {
        let xml = Element::new("SomethingElse");
        assert!(matches!(
            AccountData::parse_xml(&xml),
            Err(RealmError::Config(_))
        ));
    }
}
