use std::collections::BTreeMap;

use rhai::{Array, Dynamic, Engine, ImmutableString, Map, Scope, FLOAT, INT};
use qs_core::{ChainPart, QsValue, ScriptQueueError, TagChain};

pub const TAG_RESOLVE_ERROR: &str = "TAG_RESOLVE_ERROR";

/// What a tag may read while it is being resolved.
pub trait TagEnvironment {
    fn queue_id(&self) -> &str;

    fn definitions(&self) -> &BTreeMap<String, QsValue>;

    fn context(&self) -> &BTreeMap<String, QsValue>;

    /// Results of entries held under a `save:` name, keyed by that name.
    fn held_results(&self) -> BTreeMap<String, QsValue>;

    fn definition(&self, name: &str) -> Option<&QsValue> {
        self.definitions().get(&name.to_ascii_lowercase())
    }
}

/// Turns `<...>` placeholders into values. Hosts plug their own tag language
/// in here; the engine only ever sees the resolved values.
pub trait TagResolver: Send + Sync {
    fn resolve_tag(
        &self,
        tag: &str,
        env: &dyn TagEnvironment,
    ) -> Result<QsValue, ScriptQueueError>;

    /// A chain made of exactly one tag keeps the tag's typed value; anything
    /// else is concatenated into text.
    fn resolve(
        &self,
        chain: &TagChain,
        env: &dyn TagEnvironment,
    ) -> Result<QsValue, ScriptQueueError> {
        if let [ChainPart::Tag(tag)] = chain.parts.as_slice() {
            return self.resolve_tag(tag, env);
        }
        let mut out = String::new();
        for part in &chain.parts {
            match part {
                ChainPart::Text(text) => out.push_str(text),
                ChainPart::Tag(tag) => out.push_str(&self.resolve_tag(tag, env)?.to_string()),
            }
        }
        Ok(QsValue::String(out))
    }
}

/// Evaluates every tag as a Rhai expression. Definitions with identifier
/// names become variables; all of them are also reachable through `defs`,
/// alongside `context` and `saved`.
pub struct RhaiTagResolver {
    engine: Engine,
}

impl RhaiTagResolver {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        engine.set_max_operations(100_000);
        Self { engine }
    }

    fn build_scope(&self, env: &dyn TagEnvironment) -> Result<Scope<'static>, ScriptQueueError> {
        let mut scope = Scope::new();
        let mut defs = Map::new();
        for (name, value) in env.definitions() {
            let dynamic = value_to_dynamic(value)?;
            if is_identifier(name) {
                scope.push_dynamic(name.clone(), dynamic.clone());
            }
            defs.insert(name.as_str().into(), dynamic);
        }
        scope.push_constant_dynamic("defs", Dynamic::from_map(defs));
        scope.push_constant_dynamic("context", map_to_dynamic(env.context())?);
        scope.push_constant_dynamic("saved", map_to_dynamic(&env.held_results())?);
        scope.push_constant_dynamic("queue_id", Dynamic::from(env.queue_id().to_string()));
        Ok(scope)
    }
}

impl Default for RhaiTagResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TagResolver for RhaiTagResolver {
    fn resolve_tag(
        &self,
        tag: &str,
        env: &dyn TagEnvironment,
    ) -> Result<QsValue, ScriptQueueError> {
        let mut scope = self.build_scope(env)?;
        let value = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, tag)
            .map_err(|error| {
                ScriptQueueError::new(
                    TAG_RESOLVE_ERROR,
                    format!("Failed to resolve tag <{}>: {}", tag, error),
                )
            })?;
        dynamic_to_value(value)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn map_to_dynamic(values: &BTreeMap<String, QsValue>) -> Result<Dynamic, ScriptQueueError> {
    let mut map = Map::new();
    for (key, value) in values {
        map.insert(key.as_str().into(), value_to_dynamic(value)?);
    }
    Ok(Dynamic::from_map(map))
}

pub(crate) fn value_to_dynamic(value: &QsValue) -> Result<Dynamic, ScriptQueueError> {
    match value {
        QsValue::Bool(value) => Ok(Dynamic::from_bool(*value)),
        QsValue::Number(value) => {
            if value.fract().abs() < f64::EPSILON && value.abs() < INT::MAX as f64 {
                Ok(Dynamic::from_int(*value as INT))
            } else {
                Ok(Dynamic::from_float(*value as FLOAT))
            }
        }
        QsValue::String(value) => Ok(Dynamic::from(value.clone())),
        QsValue::Array(values) => {
            let mut array = Array::new();
            for value in values {
                array.push(value_to_dynamic(value)?);
            }
            Ok(Dynamic::from_array(array))
        }
        QsValue::Map(values) => map_to_dynamic(values),
    }
}

pub(crate) fn dynamic_to_value(value: Dynamic) -> Result<QsValue, ScriptQueueError> {
    if value.is_unit() {
        return Ok(QsValue::String(String::new()));
    }
    if value.is::<bool>() {
        return Ok(QsValue::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(QsValue::Number(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(QsValue::Number(value.cast::<FLOAT>()));
    }
    if value.is::<char>() {
        return Ok(QsValue::String(value.cast::<char>().to_string()));
    }
    if value.is::<ImmutableString>() {
        return Ok(QsValue::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_value(item)?);
        }
        return Ok(QsValue::Array(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = BTreeMap::new();
        for (key, value) in map {
            out.insert(key.to_string(), dynamic_to_value(value)?);
        }
        return Ok(QsValue::Map(out));
    }

    Err(ScriptQueueError::new(
        TAG_RESOLVE_ERROR,
        format!("Unsupported tag value type {}.", value.type_name()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEnv {
        definitions: BTreeMap<String, QsValue>,
        context: BTreeMap<String, QsValue>,
        saved: BTreeMap<String, QsValue>,
    }

    impl TagEnvironment for FixedEnv {
        fn queue_id(&self) -> &str {
            "main_TestQueue"
        }

        fn definitions(&self) -> &BTreeMap<String, QsValue> {
            &self.definitions
        }

        fn context(&self) -> &BTreeMap<String, QsValue> {
            &self.context
        }

        fn held_results(&self) -> BTreeMap<String, QsValue> {
            self.saved.clone()
        }
    }

    fn env() -> FixedEnv {
        FixedEnv {
            definitions: BTreeMap::from([
                ("count".to_string(), QsValue::Number(3.0)),
                ("name".to_string(), QsValue::from("Ada")),
                ("odd-name".to_string(), QsValue::from("dash")),
            ]),
            context: BTreeMap::from([("player".to_string(), QsValue::from("Bob"))]),
            saved: BTreeMap::from([(
                "fetch".to_string(),
                QsValue::Map(BTreeMap::from([(
                    "status".to_string(),
                    QsValue::from("ok"),
                )])),
            )]),
        }
    }

    fn chain(parts: Vec<ChainPart>) -> TagChain {
        TagChain { parts }
    }

    #[test]
    fn single_tag_keeps_its_type() {
        let resolver = RhaiTagResolver::new();
        let value = resolver
            .resolve(&chain(vec![ChainPart::Tag("count + 1".to_string())]), &env())
            .expect("resolve");
        assert_eq!(value, QsValue::Number(4.0));

        let flag = resolver
            .resolve(&chain(vec![ChainPart::Tag("count > 2".to_string())]), &env())
            .expect("resolve");
        assert_eq!(flag, QsValue::Bool(true));
    }

    #[test]
    fn mixed_chain_is_concatenated_text() {
        let resolver = RhaiTagResolver::new();
        let value = resolver
            .resolve(
                &chain(vec![
                    ChainPart::Text("hi ".to_string()),
                    ChainPart::Tag("name".to_string()),
                    ChainPart::Text("/".to_string()),
                    ChainPart::Tag("context.player".to_string()),
                    ChainPart::Text("/".to_string()),
                    ChainPart::Tag("defs[\"odd-name\"]".to_string()),
                ]),
                &env(),
            )
            .expect("resolve");
        assert_eq!(value, QsValue::from("hi Ada/Bob/dash"));
    }

    #[test]
    fn saved_results_and_queue_id_are_visible() {
        let resolver = RhaiTagResolver::new();
        let env = env();
        assert_eq!(
            resolver.resolve_tag("saved.fetch.status", &env).expect("saved"),
            QsValue::from("ok")
        );
        assert_eq!(
            resolver.resolve_tag("queue_id", &env).expect("queue id"),
            QsValue::from("main_TestQueue")
        );
    }

    #[test]
    fn undefined_variables_fail_with_tag_error() {
        let resolver = RhaiTagResolver::new();
        let error = resolver
            .resolve_tag("missing_value", &env())
            .expect_err("strict variables");
        assert_eq!(error.code, TAG_RESOLVE_ERROR);
        assert!(error.message.contains("missing_value"));
    }

    #[test]
    fn bridge_keeps_nested_collections() {
        let value = QsValue::Map(BTreeMap::from([(
            "k".to_string(),
            QsValue::Array(vec![QsValue::Bool(false), QsValue::Number(2.5)]),
        )]));
        let dynamic = value_to_dynamic(&value).expect("to dynamic");
        assert_eq!(dynamic_to_value(dynamic).expect("back"), value);
        assert_eq!(
            dynamic_to_value(Dynamic::UNIT).expect("unit"),
            QsValue::from("")
        );
    }
}
