use buildnpm_core::TypeRestriction;
use tracing::debug;

/// Keys that are re-injected explicitly and must not be copied from the
/// effective configuration.
const RESERVED_KEYS: &[&str] = &["registry", "metrics-registry", "json"];

/// Directives of a project `.npmrc`, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfigDocument {
    directives: Vec<String>,
}

impl RegistryConfigDocument {
    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    pub fn render(&self) -> String {
        let mut rendered = self.directives.join("\n");
        rendered.push('\n');
        rendered
    }

    fn push(&mut self, directive: String) {
        self.directives.push(directive);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedConfig {
    pub document: RegistryConfigDocument,
    pub restriction: TypeRestriction,
}

/// Rewrites an `npm config list` dump into a project `.npmrc` that resolves
/// everything through `registry_url`.
///
/// Lines are evaluated independently; anything unrecognised is dropped.
pub fn translate_npm_config(
    config_list: &str,
    registry_url: &str,
    json_output: bool,
    auth_directives: &[String],
) -> TranslatedConfig {
    let mut document = RegistryConfigDocument::default();
    let mut restriction = TypeRestriction::Default;

    for line in config_list.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let (raw_key, raw_value) = match line.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (line, None),
        };
        let key = raw_key.trim();

        if key.starts_with('@') {
            document.push(format!("{key} = {registry_url}"));
            continue;
        }

        let Some(raw_value) = raw_value else {
            debug!(line, "dropping npm config line without a value");
            continue;
        };
        if !is_copyable_key(key) {
            continue;
        }

        let value = raw_value.trim();
        if value.starts_with('[') && value.ends_with(']') {
            push_array_directives(&mut document, key, value);
        } else {
            document.push(line.to_string());
        }
        restriction = classify_restriction(restriction, key, value);
    }

    document.push(format!("json = {json_output}"));
    document.push(format!("registry = {registry_url}"));
    for directive in auth_directives {
        document.push(directive.clone());
    }

    TranslatedConfig {
        document,
        restriction,
    }
}

fn is_copyable_key(key: &str) -> bool {
    !key.starts_with("//") && !key.starts_with(';') && !RESERVED_KEYS.contains(&key)
}

fn push_array_directives(document: &mut RegistryConfigDocument, key: &str, value: &str) {
    let inner = value[1..value.len() - 1].trim();
    if inner.is_empty() {
        return;
    }
    for element in inner.split(',') {
        document.push(format!("{key}[] = {}", element.trim()));
    }
}

/// `omit` is how npm 7+ reports restrictions and always wins. The deprecated
/// `only` / `production` keys are listed by priority, so only the first one
/// seen counts.
pub(crate) fn classify_restriction(
    current: TypeRestriction,
    key: &str,
    value: &str,
) -> TypeRestriction {
    if key == "omit" {
        return if value.contains("dev") {
            TypeRestriction::ProdOnly
        } else {
            TypeRestriction::All
        };
    }
    if current.is_set() {
        return current;
    }

    match key {
        "only" if value.contains("prod") => TypeRestriction::ProdOnly,
        "only" if value.contains("dev") => TypeRestriction::DevOnly,
        "production" if value.contains("true") => TypeRestriction::ProdOnly,
        _ => current,
    }
}
