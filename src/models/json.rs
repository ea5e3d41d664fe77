//! Model JSON in the tagged flat form and the nested legacy triode form.
//!
//! Flat: `{"device": "triode", "type": "koren", "mu": .., "kg": .., ...}`.
//! Nested: `{"triode": {"vg1Max": 4.0, "koren": {"mu": .., ...}}}`.
//!
//! Only the coefficients of the model's family are written; keys absent on
//! read keep the family default.

use serde_json::{Map, Value};

use crate::error::{Result, TubeError};

use super::parameter::ParameterId;
use super::{DeviceModel, DeviceType, Model, ModelKind};

/// JSON key for a coefficient. `X` and `Alpha` share `"alpha"` in triode
/// files, so pentodes write `X` under `"x"` instead.
fn key(id: ParameterId, device: DeviceType) -> &'static str {
    match (id, device) {
        (ParameterId::X, DeviceType::Triode) => "alpha",
        (ParameterId::X, DeviceType::Pentode) => "x",
        (ParameterId::Kg1, _) => "kg",
        (ParameterId::Mu, _) => "mu",
        (ParameterId::Kp, _) => "kp",
        (ParameterId::Kvb, _) => "kvb",
        (ParameterId::Kvb1, _) => "kvb1",
        (ParameterId::Vct, _) => "vct",
        (ParameterId::Kg2, _) => "kg2",
        (ParameterId::Kg2a, _) => "kg2a",
        (ParameterId::A, _) => "a",
        (ParameterId::Alpha, _) => "alpha",
        (ParameterId::Beta, _) => "beta",
        (ParameterId::Gamma, _) => "gamma",
        (ParameterId::Os, _) => "os",
        (ParameterId::Tau, _) => "tau",
        (ParameterId::Rho, _) => "rho",
        (ParameterId::Theta, _) => "theta",
        (ParameterId::Psi, _) => "psi",
        (ParameterId::Omega, _) => "omega",
        (ParameterId::Lambda, _) => "lambda",
        (ParameterId::Nu, _) => "nu",
        (ParameterId::S, _) => "s",
        (ParameterId::Ap, _) => "ap",
    }
}

fn write_parameters(model: &dyn DeviceModel, obj: &mut Map<String, Value>) {
    let device = model.device_type();
    for &id in model.json_ids() {
        obj.insert(key(id, device).to_string(), Value::from(model.value(id)));
    }
}

fn read_parameters(model: &mut Model, obj: &Map<String, Value>) {
    let device = model.device_type();
    let ids = model.json_ids();
    let params = model.parameters_mut();
    for &id in ids {
        if let Some(v) = obj.get(key(id, device)).and_then(Value::as_f64) {
            params.set(id, v);
        }
    }
}

/// Tagged flat JSON for any model.
pub fn model_to_json(model: &dyn DeviceModel) -> Value {
    let kind = model.kind();
    let mut obj = Map::new();
    obj.insert("device".into(), Value::from(kind.device_type().tag()));
    obj.insert("type".into(), Value::from(kind.type_tag()));
    match kind {
        ModelKind::ReefmanDerk => {
            obj.insert("variant".into(), Value::from("derk"));
        }
        ModelKind::ReefmanDerkE => {
            obj.insert("variant".into(), Value::from("derkE"));
        }
        ModelKind::ExtractDerkE => {
            obj.insert(
                "secondaryEmission".into(),
                Value::from(model.secondary_emission()),
            );
        }
        _ => {}
    }
    write_parameters(model, &mut obj);
    Value::Object(obj)
}

/// Nested legacy form. Pentode models have no nested form and fall back
/// to the flat form.
pub fn model_to_nested_json(model: &dyn DeviceModel, vg1_max: f64) -> Value {
    let kind = model.kind();
    if kind.device_type() != DeviceType::Triode {
        return model_to_json(model);
    }

    let mut params = Map::new();
    write_parameters(model, &mut params);

    let mut triode = Map::new();
    triode.insert("vg1Max".into(), Value::from(vg1_max));
    triode.insert(kind.type_tag().into(), Value::Object(params));

    let mut root = Map::new();
    root.insert("triode".into(), Value::Object(triode));
    Value::Object(root)
}

/// Parse either JSON form into a model.
pub(crate) fn model_from_json(value: &Value) -> Result<Model> {
    let obj = value
        .as_object()
        .ok_or_else(|| TubeError::invalid_json("model", "expected an object"))?;

    if let Some(nested) = obj.get("triode").and_then(Value::as_object) {
        return nested_from_json(nested);
    }

    let type_tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TubeError::missing_field("type", "model"))?;
    let device = match obj.get("device").and_then(Value::as_str) {
        None | Some("triode") => DeviceType::Triode,
        Some("pentode") => DeviceType::Pentode,
        Some(other) => return Err(TubeError::unknown_model(other, type_tag)),
    };
    let variant = obj.get("variant").and_then(Value::as_str);

    let kind = ModelKind::from_tags(device, type_tag, variant)?;
    let mut model = Model::new(kind);
    if let Some(enabled) = obj.get("secondaryEmission").and_then(Value::as_bool) {
        model.set_secondary_emission(enabled);
    }
    read_parameters(&mut model, obj);
    Ok(model)
}

fn nested_from_json(nested: &Map<String, Value>) -> Result<Model> {
    let triode_kinds = [
        ModelKind::Simple,
        ModelKind::Koren,
        ModelKind::CohenHelie,
        ModelKind::Gardiner,
    ];
    for kind in triode_kinds {
        if let Some(params) = nested.get(kind.type_tag()).and_then(Value::as_object) {
            let mut model = Model::new(kind);
            read_parameters(&mut model, params);
            return Ok(model);
        }
    }
    Err(TubeError::invalid_json(
        "model",
        "nested triode object names no known model type",
    ))
}

/// `vg1Max` of a nested legacy triode object, if present.
pub(crate) fn nested_vg1_max(value: &Value) -> Option<f64> {
    value.get("triode")?.get("vg1Max")?.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_flat_round_trip_keeps_coefficients() {
        let mut model = Model::new(ModelKind::CohenHelie);
        model.parameters_mut().set(ParameterId::Mu, 37.5);
        model.parameters_mut().set(ParameterId::X, 1.31);

        let value = model.to_json();
        assert_eq!(value["device"], "triode");
        assert_eq!(value["type"], "cohenHelie");
        assert_relative_eq!(value["alpha"].as_f64().unwrap(), 1.31);
        assert!(value.get("kg2").is_none());

        let back = Model::from_json(&value).unwrap();
        assert_eq!(back.kind(), ModelKind::CohenHelie);
        assert_relative_eq!(back.value(ParameterId::Mu), 37.5);
        assert_relative_eq!(back.value(ParameterId::X), 1.31);
    }

    #[test]
    fn test_pentode_keys_and_tags() {
        let mut model = Model::new(ModelKind::ExtractDerkE);
        model.set_secondary_emission(true);
        model.parameters_mut().set(ParameterId::Alpha, 0.25);
        model.parameters_mut().set(ParameterId::X, 1.33);

        let value = model.to_json();
        assert_eq!(value["secondaryEmission"], true);
        assert_relative_eq!(value["alpha"].as_f64().unwrap(), 0.25);
        assert_relative_eq!(value["x"].as_f64().unwrap(), 1.33);

        let back = Model::from_json(&value).unwrap();
        assert!(back.secondary_emission());
        assert_relative_eq!(back.value(ParameterId::Alpha), 0.25);

        let derk = Model::new(ModelKind::ReefmanDerk).to_json();
        assert_eq!(derk["variant"], "derk");
        assert_eq!(Model::from_json(&derk).unwrap().kind(), ModelKind::ReefmanDerk);
    }

    #[test]
    fn test_koren_key_set() {
        let value = Model::new(ModelKind::Koren).to_json();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["alpha", "device", "kg", "kp", "kvb", "mu", "type", "vct"]
        );
        assert_relative_eq!(value["vct"].as_f64().unwrap(), 0.1);

        let nested = model_to_nested_json(&Model::new(ModelKind::Koren), 4.0);
        let params = nested["triode"]["koren"].as_object().unwrap();
        let mut keys: Vec<&str> = params.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["alpha", "kg", "kp", "kvb", "mu", "vct"]);

        let mut source = Model::new(ModelKind::Koren);
        source.parameters_mut().set(ParameterId::Vct, 0.35);
        let back = Model::from_json(&source.to_json()).unwrap();
        assert_relative_eq!(back.value(ParameterId::Vct), 0.35);
    }

    #[test]
    fn test_nested_legacy_form() {
        let value = json!({
            "triode": {
                "vg1Max": 5.0,
                "koren": { "mu": 20.0, "kg": 1.5, "alpha": 1.3, "kp": 250.0, "kvb": 400.0 }
            }
        });
        let model = Model::from_json(&value).unwrap();
        assert_eq!(model.kind(), ModelKind::Koren);
        assert_relative_eq!(model.value(ParameterId::Kg1), 1.5);
        assert_relative_eq!(nested_vg1_max(&value).unwrap(), 5.0);

        let out = model_to_nested_json(&model, 5.0);
        assert_relative_eq!(out["triode"]["koren"]["kp"].as_f64().unwrap(), 250.0);
    }

    #[test]
    fn test_missing_device_defaults_to_triode() {
        let model = Model::from_json(&json!({"type": "simple", "mu": 12.0})).unwrap();
        assert_eq!(model.kind(), ModelKind::Simple);
        assert_relative_eq!(model.value(ParameterId::Mu), 12.0);
        // Missing keys keep defaults.
        assert_relative_eq!(model.value(ParameterId::Kg1), 0.7);
    }

    #[test]
    fn test_rejects_unknown_tags() {
        assert!(Model::from_json(&json!({"device": "pentode", "type": "koren"})).is_err());
        assert!(Model::from_json(&json!({"device": "triode"})).is_err());
        assert!(Model::from_json(&json!([1, 2])).is_err());
        assert!(Model::from_json(&json!({"triode": {"vg1Max": 1.0}})).is_err());
    }
}
