use crate::error::ProviderError;

pub trait TemplateStore {
    fn fetch_template(&self, bucket: &str, key: &str) -> Result<String, ProviderError>;
}
