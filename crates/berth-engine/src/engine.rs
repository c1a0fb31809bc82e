//! Template engine based on MiniJinja

use berth_core::{ChartMetadata, ChartSource, Values};
use minijinja::Environment;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Result, TemplateError};
use crate::filters;

/// Release identity exposed to templates as `release`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
}

impl ReleaseInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// Everything a chart template can see
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Final merged values
    pub values: Values,
    pub release: ReleaseInfo,
    pub chart: ChartMetadata,
}

impl RenderContext {
    pub fn new(values: Values, release: ReleaseInfo, chart: ChartMetadata) -> Self {
        Self {
            values,
            release,
            chart,
        }
    }
}

/// Result of rendering a chart
#[derive(Debug, Default)]
pub struct RenderResult {
    /// Rendered manifests by template name, in name order
    pub manifests: BTreeMap<String, String>,

    /// Rendered NOTES.txt, if the chart has one
    pub notes: Option<String>,
}

impl RenderResult {
    /// All manifests joined into one multi-document YAML stream
    pub fn to_stream(&self) -> String {
        let mut out = String::new();
        for (name, content) in &self.manifests {
            out.push_str("---\n# Source: ");
            out.push_str(name);
            out.push('\n');
            out.push_str(content.trim_start_matches("---").trim());
            out.push('\n');
        }
        out
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);

        env.add_function("image", filters::image);
        env.add_function("fail", filters::fail);

        env
    }

    fn template_context(context: &RenderContext) -> minijinja::Value {
        minijinja::context! {
            values => context.values.inner(),
            release => &context.release,
            chart => &context.chart,
        }
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        context: &RenderContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        tmpl.render(Self::template_context(context))
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template).into())
    }

    /// Render every template of a chart
    ///
    /// Files whose name starts with `_` are loaded for `include`/`import`
    /// but not rendered on their own. Templates that render to nothing are
    /// dropped.
    pub fn render_chart(
        &self,
        chart: &ChartSource,
        context: &RenderContext,
    ) -> Result<RenderResult> {
        let template_files = chart.template_files()?;

        let mut env = self.create_environment();
        let mut sources = BTreeMap::new();

        for file_path in &template_files {
            let rel_path = file_path.strip_prefix(&chart.templates_dir).unwrap_or(file_path);
            let template_name = rel_path.to_string_lossy().replace('\\', "/");
            let content = std::fs::read_to_string(file_path)?;

            env.add_template_owned(template_name.clone(), content.clone())
                .map_err(|e| TemplateError::from_minijinja(e, &template_name, &content))?;
            sources.insert(template_name, content);
        }

        let ctx = Self::template_context(context);
        let mut result = RenderResult::default();

        for (template_name, content) in &sources {
            let is_helper = template_name
                .rsplit('/')
                .next()
                .is_some_and(|file| file.starts_with('_'));
            if is_helper {
                continue;
            }

            let tmpl = env
                .get_template(template_name)
                .map_err(|e| TemplateError::from_minijinja(e, template_name, content))?;
            let rendered = tmpl
                .render(&ctx)
                .map_err(|e| TemplateError::from_minijinja(e, template_name, content))?;

            if template_name.eq_ignore_ascii_case("NOTES.txt") {
                result.notes = Some(rendered);
                continue;
            }

            let trimmed = rendered.trim();
            if !trimmed.is_empty() && trimmed != "---" {
                let output_name = template_name.trim_end_matches(".j2").to_string();
                result.manifests.insert(output_name, rendered);
            }
        }

        tracing::debug!(
            templates = sources.len(),
            manifests = result.manifests.len(),
            "rendered chart"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use semver::Version;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_context() -> RenderContext {
        let values = Values::from_yaml(
            r#"
replicas: 3
namespace: staging
images:
  web:
    image: registry.example.com/demo/web:abc123
"#,
        )
        .unwrap();

        let chart = ChartMetadata {
            api_version: "v2".to_string(),
            name: "demo".to_string(),
            version: Version::new(1, 0, 0),
            description: None,
            app_version: Some("2.0.0".to_string()),
        };

        RenderContext::new(values, ReleaseInfo::new("demo-staging", "staging"), chart)
    }

    #[test]
    fn test_render_simple() {
        let engine = Engine::default();
        let result = engine
            .render_string("replicas: {{ values.replicas }}", &create_test_context(), "t.yaml")
            .unwrap();
        assert_eq!(result, "replicas: 3");
    }

    #[test]
    fn test_render_release_and_chart() {
        let engine = Engine::default();
        let result = engine
            .render_string(
                "{{ release.name }}/{{ release.namespace }}/{{ chart.name }}-{{ chart.version }}",
                &create_test_context(),
                "t.yaml",
            )
            .unwrap();
        assert_eq!(result, "demo-staging/staging/demo-1.0.0");
    }

    #[test]
    fn test_undefined_is_error_in_strict_mode() {
        let err = Engine::default()
            .render_string("{{ values.missing }}", &create_test_context(), "t.yaml")
            .unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));

        let lenient = Engine::builder().strict(false).build();
        assert_eq!(
            lenient
                .render_string("[{{ values.missing }}]", &create_test_context(), "t.yaml")
                .unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_render_chart() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(
            templates.join("_helpers.tpl"),
            "{% macro labels(name) %}app: {{ name }}{% endmacro %}",
        )
        .unwrap();
        fs::write(
            templates.join("deployment.yaml"),
            "{% from '_helpers.tpl' import labels %}kind: Deployment\nmetadata:\n  labels:\n    {{ labels(chart.name) }}\nspec:\n  template:\n    spec:\n      containers:\n        - image: {{ image('web') }}\n",
        )
        .unwrap();
        fs::write(templates.join("disabled.yaml"), "{% if false %}kind: Job{% endif %}").unwrap();
        fs::write(templates.join("NOTES.txt"), "Deployed {{ release.name }}").unwrap();

        let chart = ChartSource::load(dir.path()).unwrap();
        let result = Engine::default()
            .render_chart(&chart, &create_test_context())
            .unwrap();

        assert_eq!(result.manifests.len(), 1);
        let deployment = &result.manifests["deployment.yaml"];
        assert!(deployment.contains("app: demo"));
        assert!(deployment.contains("image: registry.example.com/demo/web:abc123"));
        assert_eq!(result.notes.as_deref(), Some("Deployed demo-staging"));
        assert!(result.to_stream().starts_with("---\n# Source: deployment.yaml\n"));
    }
}
