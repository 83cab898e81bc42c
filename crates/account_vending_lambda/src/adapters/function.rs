use crate::error::ProviderError;

pub trait FunctionRemover {
    fn delete_function(&self, function_name: &str) -> Result<(), ProviderError>;
}
