use crate::error::NotifyError;
use crate::NotificationChannel;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

/// Factory for creating [`NotificationChannel`] instances from JSON
/// configuration.
///
/// Each plugin is registered in the [`ChannelRegistry`] by its `name()`,
/// which is matched against the `channel_type` of the stored credentials.
pub trait ChannelPlugin: Send + Sync {
    /// Returns the plugin type name (e.g., `"sms"`, `"webhook"`).
    fn name(&self) -> &str;

    /// Validates a JSON config blob against this plugin's expected schema.
    fn validate_config(&self, config: &Value) -> Result<()>;

    /// Creates a configured channel instance from a validated JSON config.
    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>>;

    /// Returns a copy of `config` with secrets redacted. Used for logging.
    fn redact_config(&self, config: &Value) -> Value {
        crate::utils::redact_sensitive_json(config)
    }
}

/// Registry of available [`ChannelPlugin`]s.
///
/// # Examples
///
/// ```
/// use vitalwatch_notify::plugin::ChannelRegistry;
///
/// let registry = ChannelRegistry::default();
/// assert!(registry.has_plugin("sms"));
/// assert!(registry.has_plugin("webhook"));
/// assert!(!registry.has_plugin("pager"));
/// ```
pub struct ChannelRegistry {
    plugins: HashMap<String, Box<dyn ChannelPlugin>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ChannelPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn create_channel(
        &self,
        type_name: &str,
        config: &Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| NotifyError::UnknownChannelType(type_name.to_string()))?;
        plugin.validate_config(config)?;
        tracing::debug!(
            channel = type_name,
            config = %plugin.redact_config(config),
            "Creating notification channel"
        );
        plugin.create_channel(config)
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn ChannelPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::sms::SmsPlugin));
        registry.register(Box::new(crate::channels::webhook::WebhookPlugin));
        registry
    }
}
