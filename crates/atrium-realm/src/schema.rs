//! Per-storage-class account property schemas.
//!
//! An [`AccountDataDef`] declares which properties an account carries in
//! one storage class, with a value type and a mandatory flag per property.
//! Value types themselves belong to the platform's type service; this crate
//! only calls them through the [`ValueType`] seam.

use std::collections::BTreeMap;
use std::sync::Arc;

use atrium_types::xml::Element;
use atrium_types::Properties;

use crate::data::AccountData;
use crate::error::{RealmError, Result};

/// A value type from the platform's type service.
///
/// The realm calls `validate` before accepting a property value; it never
/// interprets values beyond that.
pub trait ValueType: Send + Sync {
    /// The type name as it appears in configuration.
    fn name(&self) -> &str;

    /// Check a candidate value, returning a reason on rejection.
    fn validate(&self, value: &str) -> std::result::Result<(), String>;
}

/// Resolves configured type names to [`ValueType`] instances.
pub trait TypeRegistry: Send + Sync {
    /// Look up a type by name; `None` if the type does not exist.
    fn create(&self, name: &str) -> Option<Arc<dyn ValueType>>;
}

/// One declared account property.
#[derive(Clone)]
pub struct AccountPropertyDef {
    name: String,
    value_type: Arc<dyn ValueType>,
    mandatory: bool,
}

impl AccountPropertyDef {
    /// Declare a property.
    pub fn new(name: impl Into<String>, value_type: Arc<dyn ValueType>, mandatory: bool) -> Self {
        Self {
            name: name.into(),
            value_type,
            mandatory,
        }
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared value type.
    pub fn value_type(&self) -> &dyn ValueType {
        self.value_type.as_ref()
    }

    /// Whether the property must be present on every account.
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }
}

impl std::fmt::Debug for AccountPropertyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountPropertyDef")
            .field("name", &self.name)
            .field("type", &self.value_type.name())
            .field("mandatory", &self.mandatory)
            .finish()
    }
}

/// The account property schema for one storage class.
#[derive(Clone, Debug, Default)]
pub struct AccountDataDef {
    properties: BTreeMap<String, AccountPropertyDef>,
}

impl AccountDataDef {
    /// An empty schema: accounts carry no data in this storage class.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema from property declarations.
    pub fn new(properties: impl IntoIterator<Item = AccountPropertyDef>) -> Self {
        Self {
            properties: properties
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    /// Parse a schema from its definition document:
    ///
    /// ```xml
    /// <AccountDataDef>
    ///    <Property name="User" type="text" mandatory="true"/>
    /// </AccountDataDef>
    /// ```
    pub fn parse_xml(xml: &Element, registry: &dyn TypeRegistry) -> Result<Self> {
        if xml.name() != "AccountDataDef" {
            return Err(RealmError::Config(format!(
                "expected an <AccountDataDef/> document, got <{}/>",
                xml.name()
            )));
        }

        let mut properties = Vec::new();
        for prop in xml.children_named("Property") {
            let name = prop
                .attr("name")
                .ok_or_else(|| {
                    RealmError::Config("<Property/> element without \"name\" attribute".to_string())
                })?
                .to_string();
            let type_name = prop.attr("type").ok_or_else(|| {
                RealmError::Config(format!(
                    "<Property/> element {name:?} without \"type\" attribute"
                ))
            })?;
            let value_type = registry.create(type_name).ok_or_else(|| {
                RealmError::Config(format!(
                    "unknown type {type_name:?} for property {name:?}"
                ))
            })?;
            let mandatory = match prop.attr("mandatory") {
                None => false,
                Some("true") => true,
                Some("false") => false,
                Some(other) => {
                    return Err(RealmError::Config(format!(
                        "bad \"mandatory\" attribute {other:?} on property {name:?}"
                    )))
                }
            };
            properties.push(AccountPropertyDef::new(name, value_type, mandatory));
        }
        Ok(Self::new(properties))
    }

    /// `true` iff no properties are declared.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// The declared property names, in order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// A property declaration by name.
    pub fn property(&self, name: &str) -> Option<&AccountPropertyDef> {
        self.properties.get(name)
    }

    /// All property declarations, in name order.
    pub fn properties(&self) -> impl Iterator<Item = &AccountPropertyDef> {
        self.properties.values()
    }

    /// Build the per-class payload for a new account from the supplied
    /// properties.
    ///
    /// Every declared property that is present is validated against its
    /// type; a missing mandatory property or a rejected value aborts.
    /// Properties not declared in this class are ignored here (they belong
    /// to another class's payload).
    pub fn build(&self, supplied: &Properties) -> Result<AccountData> {
        let mut values = Properties::new();
        for def in self.properties.values() {
            match supplied.get(&def.name) {
                Some(value) => {
                    def.value_type.validate(value).map_err(|reason| {
                        RealmError::InvalidPropertyValue {
                            name: def.name.clone(),
                            reason,
                        }
                    })?;
                    values.set(def.name.clone(), value);
                }
                None if def.mandatory => {
                    return Err(RealmError::MissingProperty {
                        name: def.name.clone(),
                    })
                }
                None => {}
            }
        }
        Ok(AccountData::new(values))
    }
}

#[cfg(test)]
pub(crate) mod test_types {
    use super::*;

    /// Accepts any value.
    #[derive(Debug)]
    pub struct AnyText;

    impl ValueType for AnyText {
        fn name(&self) -> &str {
            "text"
        }

        fn validate(&self, _value: &str) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    /// Accepts only lowercase hex.
    #[derive(Debug)]
    pub struct HexText;

    impl ValueType for HexText {
        fn name(&self) -> &str {
            "hex"
        }

        fn validate(&self, value: &str) -> std::result::Result<(), String> {
            if value.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
                Ok(())
            } else {
                Err("only lowercase hex digits are allowed".to_string())
            }
        }
    }

    /// A registry over the two test types.
    pub struct TestRegistry;

    impl TypeRegistry for TestRegistry {
        fn create(&self, name: &str) -> Option<Arc<dyn ValueType>> {
            match name {
                "text" => Some(Arc::new(AnyText)),
                "hex" => Some(Arc::new(HexText)),
                _ => None,
            }
        }
    }
}
