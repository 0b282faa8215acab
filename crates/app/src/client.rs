//! Seam to the model provider.
//!
//! The router does not know how requests reach a provider; it only needs a
//! blocking call that returns the completion text or fails.

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub trait ModelClient: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, BoxError>;
}

impl<F> ModelClient for F
where
    F: Fn(&str, &str, f64, u32) -> Result<String, BoxError> + Send + Sync,
{
    fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, BoxError> {
        self(prompt, model_id, temperature, max_output_tokens)
    }
}
