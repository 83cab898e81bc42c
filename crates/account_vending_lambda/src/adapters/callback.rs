use crate::error::ProviderError;

pub trait CallbackSender {
    fn put_response(&self, response_url: &str, body: &str) -> Result<(), ProviderError>;
}
