//! Integration tests for configuration trees: linkage, notification and persistence.

use parking_lot::Mutex;
use reactive_config::prelude::*;
use reactive_config::sources::codec;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

struct Schemas {
    color: Arc<ModelSchema>,
    font: Arc<ModelSchema>,
    theme: Arc<ModelSchema>,
    app: Arc<ModelSchema>,
}

fn schemas() -> Schemas {
    let color = ModelSchema::builder("Color")
        .field("name", FieldType::String)
        .field_with_default("alpha", FieldType::Float, 1.0)
        .build();
    let font = ModelSchema::builder("Font")
        .field("family", FieldType::String)
        .field("size", FieldType::Integer)
        .constrained(|value: &Value| match value.as_i64() {
            Some(size) if size > 0 => Ok(()),
            _ => Err(ValidationError::invalid_field("size", "must be positive")),
        })
        .build();
    let theme = ModelSchema::builder("Theme")
        .field("color", FieldType::String)
        .field("fonts", FieldType::list(FieldType::model(&font)))
        .field("palette", FieldType::map(FieldType::model(&color)))
        .build();
    let app = ModelSchema::builder("App")
        .field("version", FieldType::String)
        .field("theme", FieldType::model(&theme))
        .field_with_default("debug", FieldType::Bool, false)
        .build();
    Schemas {
        color,
        font,
        theme,
        app,
    }
}

fn app_tree() -> KvTree {
    json!({
        "version": "0.0.0",
        "theme": {
            "color": "red",
            "fonts": [
                {"family": "Mono", "size": 12},
                {"family": "Sans", "size": 14}
            ],
            "palette": {
                "primary": {"name": "navy", "alpha": 0.5},
                "accent": {"name": "gold"}
            }
        }
    })
}

fn counting(counter: &Arc<AtomicUsize>) -> Callback {
    let counter = Arc::clone(counter);
    Callback::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn belongs_to(model: &Model, root: &RootModel) -> bool {
    model
        .root()
        .is_some_and(|found| Model::ptr_eq(found.model(), root.model()))
}

#[test]
fn test_deep_nesting_links_every_child() {
    let schemas = schemas();
    let config = RootModel::from_kv(&schemas.app, &app_tree()).unwrap();

    let theme = config.child("theme").unwrap().unwrap();
    assert!(belongs_to(&theme, &config));

    let fonts = theme.get("fonts").unwrap();
    let fonts = fonts.as_list().unwrap();
    assert_eq!(fonts.len(), 2);
    for font in fonts {
        assert!(belongs_to(font.as_model().unwrap(), &config));
    }

    let palette = theme.get("palette").unwrap();
    let palette = palette.as_map().unwrap();
    assert_eq!(palette.len(), 2);
    for color in palette.values() {
        assert!(belongs_to(color.as_model().unwrap(), &config));
    }

    let accent = palette["accent"].as_model().unwrap();
    assert_eq!(accent.get("alpha").unwrap(), Value::Float(1.0));
}

#[test]
fn test_theme_replacement_scenario() {
    let schemas = schemas();
    let config = RootModel::from_kv(
        &schemas.app,
        &json!({
            "version": "0.0.0",
            "theme": {"color": "red", "fonts": [], "palette": {}}
        }),
    )
    .unwrap();

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    config
        .on_change("theme", move |value| seen_clone.lock().push(value.clone()))
        .unwrap();

    let old_theme = config.child("theme").unwrap().unwrap();
    let old_color_calls = Arc::new(AtomicUsize::new(0));
    old_theme
        .subscribe("color", &counting(&old_color_calls))
        .unwrap();

    let new_theme = Model::from_kv(
        &schemas.theme,
        &json!({"color": "blue", "fonts": [], "palette": {}}),
    )
    .unwrap();
    config.set_field("theme", new_theme.clone()).unwrap();

    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        let delivered = seen[0].as_model().unwrap();
        assert!(Model::ptr_eq(delivered, &new_theme));
        assert_eq!(delivered.get("color").unwrap(), Value::from("blue"));
    }

    assert!(belongs_to(&new_theme, &config));
    new_theme.set_field("color", "green").unwrap();
    assert_eq!(old_color_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        config.dump()["theme"]["color"],
        json!("green"),
        "the tree must reflect the replacement"
    );
}

#[test]
fn test_equal_replacement_is_silent() {
    let schemas = schemas();
    let config = RootModel::from_kv(&schemas.app, &app_tree()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    config.subscribe("theme", &counting(&calls)).unwrap();

    let copy = Model::from_kv(&schemas.theme, &config.dump()["theme"]).unwrap();
    assert_eq!(&copy, &config.child("theme").unwrap().unwrap());

    config.set_field("theme", copy).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_auto_save_nested_json() {
    let schemas = schemas();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.json");
    fs::write(&path, serde_json::to_string(&app_tree()).unwrap()).unwrap();

    let config = RootModel::from_file(&schemas.app, &path).unwrap();
    config.enable_auto_save(true);

    let theme = config.child("theme").unwrap().unwrap();
    let fonts = theme.get("fonts").unwrap();
    let first_font = fonts.as_list().unwrap()[0].as_model().unwrap().clone();
    first_font.set_field("size", 16).unwrap();

    assert_eq!(codec::read(&path).unwrap(), config.dump());
    assert_eq!(config.dump()["theme"]["fonts"][0]["size"], json!(16));
}

#[cfg(feature = "yaml")]
#[test]
fn test_auto_save_yaml() {
    let schemas = schemas();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.yaml");
    fs::write(
        &path,
        r#"
version: "1.0.0"
theme:
  color: red
  fonts:
    - family: Mono
      size: 12
  palette:
    primary:
      name: navy
"#,
    )
    .unwrap();

    let config = RootModel::from_file(&schemas.app, &path).unwrap();
    config.enable_auto_save(true);

    let theme = config.child("theme").unwrap().unwrap();
    let palette = theme.get("palette").unwrap();
    let primary = palette.as_map().unwrap()["primary"].as_model().unwrap().clone();
    primary.set_field("name", "teal").unwrap();

    let on_disk = codec::read(&path).unwrap();
    assert_eq!(on_disk, config.dump());
    assert_eq!(on_disk["theme"]["palette"]["primary"]["name"], json!("teal"));
}

#[cfg(feature = "toml")]
#[test]
fn test_load_and_save_toml() {
    let schemas = schemas();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.toml");
    fs::write(
        &path,
        r#"
version = "2.0.0"
debug = true

[theme]
color = "red"

[[theme.fonts]]
family = "Mono"
size = 12

[theme.palette.primary]
name = "navy"
alpha = 0.25
"#,
    )
    .unwrap();

    let config = RootModel::from_file(&schemas.app, &path).unwrap();
    assert_eq!(config.get("debug").unwrap(), Value::Bool(true));

    config.set_field("version", "2.0.1").unwrap();
    config.save().unwrap();

    let on_disk = codec::read(&path).unwrap();
    assert_eq!(on_disk["version"], json!("2.0.1"));
    assert_eq!(on_disk["theme"]["palette"]["primary"]["alpha"], json!(0.25));
}

#[cfg(feature = "toml")]
#[test]
fn test_toml_with_unset_optional_field() {
    let schema = ModelSchema::builder("Service")
        .field("name", FieldType::String)
        .field("note", FieldType::optional(FieldType::String))
        .build();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("service.toml");
    fs::write(&path, "name = \"api\"\n").unwrap();

    let config = RootModel::from_file(&schema, &path).unwrap();
    assert_eq!(config.get("note").unwrap(), Value::Null);
    config.save().unwrap();
    assert_eq!(
        RootModel::from_file(&schema, &path).unwrap().dump(),
        config.dump()
    );

    let failures = Arc::new(AtomicUsize::new(0));
    let failures_clone = Arc::clone(&failures);
    config.on_save_error(move |_| {
        failures_clone.fetch_add(1, Ordering::SeqCst);
    });
    config.enable_auto_save(true);
    config.set_field("name", "gateway").unwrap();

    assert_eq!(failures.load(Ordering::SeqCst), 0);
    let reloaded = RootModel::from_file(&schema, &path).unwrap();
    assert_eq!(reloaded.dump(), config.dump());
    assert_eq!(reloaded.dump(), json!({"name": "gateway", "note": null}));
}

#[test]
fn test_auto_save_failure_reported_through_hook() {
    let schemas = schemas();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("app.json");
    fs::write(&path, serde_json::to_string(&app_tree()).unwrap()).unwrap();

    let config = RootModel::from_file(&schemas.app, &path).unwrap();
    let failures = Arc::new(AtomicUsize::new(0));
    let failures_clone = Arc::clone(&failures);
    config.on_save_error(move |err| {
        assert!(matches!(err, ConfigError::FileWrite { .. }));
        failures_clone.fetch_add(1, Ordering::SeqCst);
    });
    config.enable_auto_save(true);

    fs::remove_file(&path).unwrap();
    fs::create_dir(&path).unwrap();

    config.set_field("version", "9.9.9").unwrap();
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(config.get("version").unwrap(), Value::from("9.9.9"));
}

#[test]
fn test_constraint_rejects_write() {
    let schemas = schemas();
    let font = Model::from_kv(&schemas.font, &json!({"family": "Mono", "size": 12})).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    font.subscribe("size", &counting(&calls)).unwrap();

    let err = font.set_field("size", 0).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { ref field, .. } if field == "size"));
    assert_eq!(font.get("size").unwrap(), Value::Integer(12));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let rejected = Model::from_kv(&schemas.font, &json!({"family": "Mono", "size": -1}));
    assert!(rejected.is_err());
}

#[test]
fn test_callback_identity() {
    let schemas = schemas();
    let color = Model::from_kv(&schemas.color, &json!({"name": "red"})).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let callback = counting(&calls);
    let same = callback.clone();
    let lookalike = counting(&calls);
    assert_eq!(callback, same);
    assert_ne!(callback, lookalike);

    color.subscribe("name", &callback).unwrap();
    color.subscribe("name", &same).unwrap();
    color.subscribe("name", &lookalike).unwrap();
    assert_eq!(color.subscriber_count("name").unwrap(), 2);

    color.set_field("name", "blue").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    color.unsubscribe("name", &same).unwrap();
    assert!(!color.is_subscribed("name", &callback));
    assert!(matches!(
        color.unsubscribe("name", &callback),
        Err(ConfigError::NotSubscribed { .. })
    ));
}

#[test]
fn test_subscribe_many_is_deterministic() {
    let schemas = schemas();
    let color = Model::from_kv(&schemas.color, &json!({"name": "red"})).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let a = counting(&calls);
    let b = counting(&calls);

    let err = color
        .subscribe_many([("missing", &a), ("name", &a), ("other", &b), ("alpha", &b)])
        .unwrap_err();
    match err {
        ConfigError::Multiple(errors) => {
            let fields: Vec<_> = errors
                .iter()
                .map(|e| match e {
                    ConfigError::UnknownField { field, .. } => field.as_str(),
                    other => panic!("unexpected error {:?}", other),
                })
                .collect();
            assert_eq!(fields, ["missing", "other"]);
        }
        other => panic!("expected Multiple, got {:?}", other),
    }
    assert!(color.is_subscribed("name", &a));
    assert!(color.is_subscribed("alpha", &b));

    color.unsubscribe_many([("name", &a), ("alpha", &b)]).unwrap();
    assert_eq!(color.subscriber_count("name").unwrap(), 0);
}

#[test]
fn test_subscriber_may_write_other_fields() {
    let schemas = schemas();
    let config = RootModel::from_kv(&schemas.app, &app_tree()).unwrap();
    let theme = config.child("theme").unwrap().unwrap();

    let target = config.model().clone();
    theme
        .on_change("color", move |_| {
            target.set_field("debug", true).unwrap();
        })
        .unwrap();
    theme.set_field("color", "black").unwrap();

    assert_eq!(config.get("debug").unwrap(), Value::Bool(true));
}

#[test]
fn test_update_from_keeps_child_subscribers() {
    let schemas = schemas();
    let config = RootModel::from_kv(&schemas.app, &app_tree()).unwrap();
    let theme = config.child("theme").unwrap().unwrap();

    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    theme
        .on_change("color", move |value| seen_clone.lock().push(value.clone()))
        .unwrap();

    let mut updated = app_tree();
    updated["theme"]["color"] = json!("purple");
    updated["unknown"] = json!(1);
    config.update_from(&updated).unwrap();

    assert_eq!(*seen.lock(), vec![Value::from("purple")]);
    assert!(Model::ptr_eq(&theme, &config.child("theme").unwrap().unwrap()));
}

#[test]
fn test_dump_roundtrips_through_construction() {
    let schemas = schemas();
    let config = RootModel::from_kv(&schemas.app, &app_tree()).unwrap();
    let dumped = config.dump();

    let keys: Vec<_> = dumped.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, ["version", "theme", "debug"]);

    let rebuilt = RootModel::from_kv(&schemas.app, &dumped).unwrap();
    assert_eq!(rebuilt.model(), config.model());
    assert_eq!(rebuilt.dump(), dumped);
}
