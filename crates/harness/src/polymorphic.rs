//! Polymorphic request decoding.
//!
//! A polymorphic base (e.g. `CreateAutonomousDatabaseBase`) is a Rust sum
//! type; each concrete variant is a struct wrapped by one enum arm. A
//! [`PolymorphicDecoder`] is the table from discriminator value to the
//! constructor for that arm. [`PolymorphicUnmarshalSpec`] binds decoders to
//! the request fields that hold them.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DecodeError;

type VariantFn<T> = Box<dyn Fn(&Value) -> Result<T, serde_json::Error> + Send + Sync>;

/// Decodes a JSON object into one variant of the base type `T`, chosen by
/// the string at `discriminator`.
///
/// Matches are exact and case-sensitive. An unknown value is always an
/// error, never a fall-through to a default variant.
pub struct PolymorphicDecoder<T> {
    base: String,
    discriminator: String,
    variants: BTreeMap<String, VariantFn<T>>,
}

impl<T> PolymorphicDecoder<T> {
    pub fn new(base: impl Into<String>, discriminator: impl Into<String>) -> Self {
        PolymorphicDecoder {
            base: base.into(),
            discriminator: discriminator.into(),
            variants: BTreeMap::new(),
        }
    }

    /// Map discriminator `value` to variant type `V`, wrapped into the base
    /// by `wrap`.
    ///
    /// # Panics
    ///
    /// Panics if `value` is already mapped; discriminator values must be
    /// unique within one base.
    pub fn variant<V, F>(mut self, value: impl Into<String>, wrap: F) -> Self
    where
        V: DeserializeOwned + 'static,
        F: Fn(V) -> T + Send + Sync + 'static,
    {
        let value = value.into();
        assert!(
            !self.variants.contains_key(&value),
            "{}: discriminator value '{}' mapped twice",
            self.base,
            value
        );
        self.variants.insert(
            value,
            Box::new(move |raw: &Value| V::deserialize(raw).map(&wrap)),
        );
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// The discriminator values this decoder accepts, in sorted order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Decode `raw` into the variant its discriminator names.
    pub fn decode(&self, raw: &Value) -> Result<T, DecodeError> {
        let object = raw.as_object().ok_or_else(|| DecodeError::NotAnObject {
            base: self.base.clone(),
        })?;

        let tag = match object.get(&self.discriminator) {
            Some(Value::String(tag)) if !tag.is_empty() => tag,
            _ => {
                return Err(DecodeError::MissingDiscriminator {
                    base: self.base.clone(),
                    field: self.discriminator.clone(),
                })
            }
        };

        let construct = self
            .variants
            .get(tag)
            .ok_or_else(|| DecodeError::UnknownDiscriminator {
                base: self.base.clone(),
                field: self.discriminator.clone(),
                value: tag.clone(),
            })?;

        construct(raw).map_err(|e| DecodeError::Variant {
            base: self.base.clone(),
            value: tag.clone(),
            message: e.to_string(),
        })
    }
}

impl<T> fmt::Debug for PolymorphicDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicDecoder")
            .field("base", &self.base)
            .field("discriminator", &self.discriminator)
            .field("values", &self.variants.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ──────────────────────────────────────────────
// Unmarshal spec
// ──────────────────────────────────────────────

type AssignFn<R> = Box<dyn Fn(&mut R, &Value) -> Result<(), DecodeError> + Send + Sync>;

struct Slot<R> {
    field: String,
    required: bool,
    discriminator: String,
    assign: AssignFn<R>,
}

/// Per-request table of polymorphic bases, keyed by base name.
///
/// Each base names the request field that holds it. When decoding, that
/// field is removed from the JSON object, the rest of the request is
/// deserialized into `R`, and the decoded variant is stored through the
/// base's assign function. `R` must therefore deserialize without the
/// field (e.g. `#[serde(skip_deserializing)]` on an `Option`).
pub struct PolymorphicUnmarshalSpec<R> {
    slots: BTreeMap<String, Slot<R>>,
}

impl<R> Default for PolymorphicUnmarshalSpec<R> {
    fn default() -> Self {
        PolymorphicUnmarshalSpec {
            slots: BTreeMap::new(),
        }
    }
}

impl<R: 'static> PolymorphicUnmarshalSpec<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a base that must be present in every request.
    pub fn base<T, F>(
        self,
        field: impl Into<String>,
        decoder: PolymorphicDecoder<T>,
        assign: F,
    ) -> Self
    where
        T: 'static,
        F: Fn(&mut R, T) + Send + Sync + 'static,
    {
        self.insert(field.into(), true, decoder, assign)
    }

    /// Register a base whose field may be absent or `null`.
    pub fn optional_base<T, F>(
        self,
        field: impl Into<String>,
        decoder: PolymorphicDecoder<T>,
        assign: F,
    ) -> Self
    where
        T: 'static,
        F: Fn(&mut R, T) + Send + Sync + 'static,
    {
        self.insert(field.into(), false, decoder, assign)
    }

    fn insert<T, F>(
        mut self,
        field: String,
        required: bool,
        decoder: PolymorphicDecoder<T>,
        assign: F,
    ) -> Self
    where
        T: 'static,
        F: Fn(&mut R, T) + Send + Sync + 'static,
    {
        let base = decoder.base().to_string();
        let discriminator = decoder.discriminator().to_string();
        let slot = Slot {
            field,
            required,
            discriminator,
            assign: Box::new(move |request: &mut R, raw: &Value| {
                let value = decoder.decode(raw)?;
                assign(request, value);
                Ok(())
            }),
        };
        self.slots.insert(base, slot);
        self
    }

    /// Bases registered in this spec.
    pub fn bases(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// The `(field, discriminator)` pair registered for `base`.
    pub fn lookup(&self, base: &str) -> Option<(&str, &str)> {
        self.slots
            .get(base)
            .map(|s| (s.field.as_str(), s.discriminator.as_str()))
    }

    /// Decode one `Request` JSON value.
    pub fn decode_request(&self, raw: &Value) -> Result<R, DecodeError>
    where
        R: DeserializeOwned,
    {
        let mut object: Map<String, Value> = raw
            .as_object()
            .cloned()
            .ok_or_else(|| DecodeError::InvalidRequest("not a JSON object".to_string()))?;

        let mut pending = Vec::with_capacity(self.slots.len());
        for (base, slot) in &self.slots {
            match object.remove(&slot.field) {
                None | Some(Value::Null) if slot.required => {
                    return Err(DecodeError::MissingSlot {
                        base: base.clone(),
                        field: slot.field.clone(),
                    })
                }
                None | Some(Value::Null) => {}
                Some(value) => pending.push((slot, value)),
            }
        }

        let mut request = R::deserialize(Value::Object(object))
            .map_err(|e| DecodeError::InvalidRequest(e.to_string()))?;

        for (slot, value) in pending {
            (slot.assign)(&mut request, &value)?;
        }
        Ok(request)
    }
}

impl<R> fmt::Debug for PolymorphicUnmarshalSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(base, slot)| (base, &slot.field)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct NewDatabase {
        db_name: String,
        admin_password: String,
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct FromBackup {
        backup_id: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum DatabaseSource {
        New(NewDatabase),
        FromBackup(FromBackup),
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct CreateDatabaseRequest {
        #[serde(rename = "CompartmentId")]
        compartment_id: String,
        #[serde(skip_deserializing)]
        details: Option<DatabaseSource>,
    }

    fn decoder() -> PolymorphicDecoder<DatabaseSource> {
        PolymorphicDecoder::new("CreateDatabaseBase", "source")
            .variant("NONE", DatabaseSource::New)
            .variant("DB_BACKUP", DatabaseSource::FromBackup)
    }

    #[test]
    fn decodes_known_variant_with_all_fields() {
        let value = decoder()
            .decode(&json!({"source": "NONE", "dbName": "orcl", "adminPassword": "pw"}))
            .unwrap();
        assert_eq!(
            value,
            DatabaseSource::New(NewDatabase {
                db_name: "orcl".into(),
                admin_password: "pw".into()
            })
        );
    }

    #[test]
    fn unknown_value_is_an_error() {
        let err = decoder()
            .decode(&json!({"source": "CLONE", "backupId": "b"}))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownDiscriminator {
                base: "CreateDatabaseBase".into(),
                field: "source".into(),
                value: "CLONE".into()
            }
        );
    }

    #[test]
    fn match_is_case_sensitive() {
        let err = decoder().decode(&json!({"source": "none"})).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownDiscriminator { .. }));
    }

    #[test]
    fn empty_or_non_string_discriminator_is_missing() {
        for raw in [
            json!({"source": "", "backupId": "b"}),
            json!({"source": 7}),
            json!({"backupId": "b"}),
        ] {
            let err = decoder().decode(&raw).unwrap_err();
            assert!(matches!(err, DecodeError::MissingDiscriminator { .. }), "{raw}");
        }
    }

    #[test]
    fn variant_field_errors_are_reported() {
        let err = decoder()
            .decode(&json!({"source": "DB_BACKUP", "backupId": 12}))
            .unwrap_err();
        match err {
            DecodeError::Variant { value, .. } => assert_eq!(value, "DB_BACKUP"),
            other => panic!("expected Variant, got {:?}", other),
        }
    }

    #[test]
    fn not_an_object() {
        let err = decoder().decode(&json!(["NONE"])).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject { .. }));
    }

    #[test]
    #[should_panic(expected = "mapped twice")]
    fn duplicate_value_panics() {
        let _ = PolymorphicDecoder::<DatabaseSource>::new("CreateDatabaseBase", "source")
            .variant("NONE", DatabaseSource::New)
            .variant("NONE", DatabaseSource::New);
    }

    #[test]
    fn values_are_listed() {
        let decoder = decoder();
        let values: Vec<&str> = decoder.values().collect();
        assert_eq!(values, vec!["DB_BACKUP", "NONE"]);
    }

    fn spec() -> PolymorphicUnmarshalSpec<CreateDatabaseRequest> {
        PolymorphicUnmarshalSpec::new().base(
            "CreateDatabaseDetails",
            decoder(),
            |request: &mut CreateDatabaseRequest, details| request.details = Some(details),
        )
    }

    #[test]
    fn spec_assigns_variant_into_slot() {
        let request = spec()
            .decode_request(&json!({
                "CompartmentId": "ocid1.compartment",
                "CreateDatabaseDetails": {"source": "DB_BACKUP", "backupId": "ocid1.backup"}
            }))
            .unwrap();
        assert_eq!(request.compartment_id, "ocid1.compartment");
        assert_eq!(
            request.details,
            Some(DatabaseSource::FromBackup(FromBackup {
                backup_id: "ocid1.backup".into()
            }))
        );
    }

    #[test]
    fn spec_lookup_is_by_base_name() {
        let spec = spec();
        assert_eq!(
            spec.lookup("CreateDatabaseBase"),
            Some(("CreateDatabaseDetails", "source"))
        );
        assert_eq!(spec.lookup("CreateDatabaseDetails"), None);
        assert_eq!(spec.bases().collect::<Vec<_>>(), vec!["CreateDatabaseBase"]);
    }

    #[test]
    fn required_slot_missing() {
        let err = spec()
            .decode_request(&json!({"CompartmentId": "c"}))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingSlot {
                base: "CreateDatabaseBase".into(),
                field: "CreateDatabaseDetails".into()
            }
        );
    }

    #[test]
    fn optional_slot_may_be_null() {
        let spec = PolymorphicUnmarshalSpec::new().optional_base(
            "CreateDatabaseDetails",
            decoder(),
            |request: &mut CreateDatabaseRequest, details| request.details = Some(details),
        );
        let request = spec
            .decode_request(&json!({"CompartmentId": "c", "CreateDatabaseDetails": null}))
            .unwrap();
        assert!(request.details.is_none());
    }

    #[test]
    fn unknown_request_fields_are_ignored() {
        let request = spec()
            .decode_request(&json!({
                "CompartmentId": "c",
                "OpcRetryToken": "t",
                "CreateDatabaseDetails": {"source": "NONE", "dbName": "a", "adminPassword": "b", "extra": 1}
            }))
            .unwrap();
        assert!(matches!(request.details, Some(DatabaseSource::New(_))));
    }
}
