pub mod rules;

use serde_json::{Map, Value};

use crate::constants::{DEFAULT_RATING, DEFAULT_SERVICE_NAME};
use crate::domain::{Country, NormalizedService, SourceRecord};
use crate::pipeline::processing::slug::identity_of;

pub use rules::{AliasChain, NormalizationRules};

/// Maps heterogeneous source documents onto the canonical service schema.
///
/// Pure and infallible: any input yields a `NormalizedService`, in the worst case one
/// built entirely from defaults. Fields outside the rule table are dropped.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    rules: NormalizationRules,
}

impl Normalizer {
    pub fn new(rules: NormalizationRules) -> Self {
        Self { rules }
    }

    pub fn normalize(&self, source: &SourceRecord, country: &Country) -> NormalizedService {
        let rules = &self.rules;

        let name = rules
            .name
            .resolve(source, non_blank_str)
            .unwrap_or(DEFAULT_SERVICE_NAME)
            .to_string();

        let category = rules.category.resolve(source, non_blank_str).map(str::to_string);
        let category_slug = rules
            .category_slug
            .resolve(source, non_blank_str)
            .map(str::to_string)
            .or_else(|| category.as_deref().and_then(identity_of));

        let rating = rules
            .rating
            .resolve(source, |v| v.as_f64().filter(|r| r.is_finite()))
            .unwrap_or(DEFAULT_RATING);

        // Only a literal `false` deactivates a service.
        let active = rules.active.resolve(source, Value::as_bool) != Some(false);

        NormalizedService {
            name,
            category,
            category_slug,
            description: rules.description.resolve(source, non_blank_str).map(str::to_string),
            images: rules.images.resolve(source, image_value),
            rating,
            neighborhood: rules.neighborhood.resolve(source, non_blank_str).map(str::to_string),
            district: rules.district.resolve(source, non_blank_str).map(str::to_string),
            active,
            tags: rules.tags.resolve(source, tag_list).unwrap_or_default(),
            country: country.as_str().to_string(),
        }
    }
}

fn non_blank_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.trim().is_empty())
}

/// A structured image map is taken as-is; a bare URL becomes `{main: url}`.
fn image_value(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) if !map.is_empty() => Some(value.clone()),
        Value::String(url) if !url.trim().is_empty() => {
            let mut map = Map::new();
            map.insert("main".to_string(), Value::String(url.clone()));
            Some(Value::Object(map))
        }
        _ => None,
    }
}

fn tag_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) if !s.trim().is_empty() => Some(vec![s.clone()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pe() -> Country {
        Country::parse("pe").unwrap()
    }

    fn record(value: Value) -> SourceRecord {
        SourceRecord::from_value("doc", value)
    }

    #[test]
    fn maps_aliases_and_defaults() {
        let normalizer = Normalizer::default();
        let source = record(json!({
            "name": "Café Lima",
            "tags": ["coffee", "wifi"],
            "barrio": "Miraflores"
        }));

        let service = normalizer.normalize(&source, &pe());

        assert_eq!(
            serde_json::to_value(&service).unwrap(),
            json!({
                "name": "Café Lima",
                "neighborhood": "Miraflores",
                "tags": ["coffee", "wifi"],
                "active": true,
                "rating": 4.2,
                "country": "pe"
            })
        );
        assert!(service.category.is_none());
        assert!(service.description.is_none());
        assert!(service.images.is_none());
    }

    #[test]
    fn empty_record_gets_maximal_defaults() {
        let service = Normalizer::default().normalize(&record(json!({})), &pe());
        assert_eq!(service.name, "Servicio");
        assert_eq!(service.rating, 4.2);
        assert!(service.active);
        assert!(service.tags.is_empty());
        assert_eq!(service.country, "pe");
    }

    #[test]
    fn title_is_used_when_name_is_missing_or_blank() {
        let normalizer = Normalizer::default();
        let a = normalizer.normalize(&record(json!({"title": "Gasfitero Juan"})), &pe());
        assert_eq!(a.name, "Gasfitero Juan");
        let b = normalizer.normalize(&record(json!({"name": "  ", "title": "Gasfitero"})), &pe());
        assert_eq!(b.name, "Gasfitero");
    }

    #[test]
    fn neighborhood_precedence_is_first_match() {
        let normalizer = Normalizer::default();
        let all = record(json!({
            "neighborhood": "Barranco",
            "barrio": "Miraflores",
            "location": {"barrio": "Surco", "district": "Lima"}
        }));
        let service = normalizer.normalize(&all, &pe());
        assert_eq!(service.neighborhood.as_deref(), Some("Barranco"));
        assert_eq!(service.district.as_deref(), Some("Lima"));

        let nested_only = record(json!({"location": {"barrio": "Surco"}}));
        let service = normalizer.normalize(&nested_only, &pe());
        assert_eq!(service.neighborhood.as_deref(), Some("Surco"));
        assert!(service.district.is_none());
    }

    #[test]
    fn falsy_valid_values_are_preserved() {
        let service = Normalizer::default()
            .normalize(&record(json!({"name": "X", "active": false, "rating": 0})), &pe());
        assert!(!service.active);
        assert_eq!(service.rating, 0.0);

        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["active"], json!(false));
        assert_eq!(value["rating"], json!(0));
    }

    #[test]
    fn integer_rating_keeps_its_shape() {
        let normalizer = Normalizer::default();
        let whole = normalizer.normalize(&record(json!({"name": "A", "rating": 5})), &pe());
        let fractional = normalizer.normalize(&record(json!({"name": "B", "rating": 4.5})), &pe());

        assert_eq!(serde_json::to_value(&whole).unwrap()["rating"], json!(5));
        assert_eq!(serde_json::to_value(&fractional).unwrap()["rating"], json!(4.5));
        let defaulted = normalizer.normalize(&record(json!({})), &pe());
        assert_eq!(serde_json::to_value(&defaulted).unwrap()["rating"], json!(4.2));
    }

    #[test]
    fn active_uses_explicit_equality_only() {
        let normalizer = Normalizer::default();
        for raw in [json!(0), json!(""), json!("false"), json!(null), json!(true)] {
            let service = normalizer.normalize(&record(json!({"active": raw})), &pe());
            assert!(service.active, "only literal false deactivates");
        }
    }

    #[test]
    fn non_numeric_rating_falls_back() {
        let service = Normalizer::default().normalize(&record(json!({"rating": "4.9"})), &pe());
        assert_eq!(service.rating, 4.2);
    }

    #[test]
    fn image_shapes() {
        let normalizer = Normalizer::default();

        let structured = normalizer.normalize(
            &record(json!({"images": {"main": "a.jpg", "gallery": ["b.jpg"]}})),
            &pe(),
        );
        assert_eq!(
            structured.images,
            Some(json!({"main": "a.jpg", "gallery": ["b.jpg"]}))
        );

        let single = normalizer.normalize(&record(json!({"image": "https://x/y.png"})), &pe());
        assert_eq!(single.images, Some(json!({"main": "https://x/y.png"})));

        let empty = normalizer.normalize(&record(json!({"images": "", "image": ""})), &pe());
        assert!(empty.images.is_none());
        let value = serde_json::to_value(&empty).unwrap();
        assert!(value.get("images").is_none());
    }

    #[test]
    fn tags_are_always_a_list() {
        let normalizer = Normalizer::default();
        let scalar = normalizer.normalize(&record(json!({"tag": "delivery"})), &pe());
        assert_eq!(scalar.tags, vec!["delivery"]);

        let mapping = normalizer.normalize(&record(json!({"tags": {"a": 1}})), &pe());
        assert!(mapping.tags.is_empty());

        let mixed = normalizer.normalize(&record(json!({"tags": ["24h", 7, null, {"x": 1}]})), &pe());
        assert_eq!(mixed.tags, vec!["24h", "7"]);
    }

    #[test]
    fn category_slug_derived_unless_supplied() {
        let normalizer = Normalizer::default();
        let derived = normalizer.normalize(&record(json!({"category": "Peluquería Canina"})), &pe());
        assert_eq!(derived.category_slug.as_deref(), Some("peluqueria-canina"));

        let supplied = normalizer.normalize(
            &record(json!({"category": "Peluquería", "categorySlug": "grooming"})),
            &pe(),
        );
        assert_eq!(supplied.category_slug.as_deref(), Some("grooming"));

        let symbolic = normalizer.normalize(&record(json!({"category": "★"})), &pe());
        assert!(symbolic.category_slug.is_none());
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let service = Normalizer::default()
            .normalize(&record(json!({"name": "A", "ownerPhone": "999", "legacy": true})), &pe());
        let value = serde_json::to_value(&service).unwrap();
        assert!(value.get("ownerPhone").is_none());
        assert!(value.get("legacy").is_none());
    }

    #[test]
    fn normalizing_a_canonical_record_is_idempotent() {
        let normalizer = Normalizer::default();
        let source = record(json!({
            "title": "Taller Mecánico Ruiz",
            "category": "Mecánica",
            "description": "Frenos y suspensión",
            "image": "https://img/1.png",
            "rating": 4.7,
            "location": {"barrio": "Surquillo", "district": "Lima"},
            "active": false,
            "tag": ["autos"]
        }));

        let first = normalizer.normalize(&source, &pe());
        let canonical = record(serde_json::to_value(&first).unwrap());
        let second = normalizer.normalize(&canonical, &pe());

        assert_eq!(first, second);
    }

    #[test]
    fn custom_rule_table_changes_precedence() {
        let rules = NormalizationRules {
            name: AliasChain::new(["nombre", "name"]),
            ..NormalizationRules::default()
        };
        let service = Normalizer::new(rules)
            .normalize(&record(json!({"name": "B", "nombre": "A"})), &pe());
        assert_eq!(service.name, "A");
    }
}
