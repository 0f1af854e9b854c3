//! Thread generation backends.
//!
//! The hosted-model call sits behind [`ThreadGenerator`] so handlers and
//! tests never depend on a network service. The default backend threads the
//! caller's text directly with the segmenter.

use async_trait::async_trait;
use threadloom_core::{Segment, ThreadloomResult};
use threadloom_segment::{segment_with, SegmentOptions};

/// Produces a post sequence for admitted requests.
#[async_trait]
pub trait ThreadGenerator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn generate(&self, text: &str, options: &SegmentOptions)
        -> ThreadloomResult<Vec<Segment>>;
}

/// Splits the supplied text without rewriting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentingGenerator;

#[async_trait]
impl ThreadGenerator for SegmentingGenerator {
    fn name(&self) -> &'static str {
        "segmenter"
    }

    async fn generate(
        &self,
        text: &str,
        options: &SegmentOptions,
    ) -> ThreadloomResult<Vec<Segment>> {
        segment_with(text, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_segmenting_generator_numbers_posts() -> ThreadloomResult<()> {
        let text = "First sentence here. Second sentence here. Third one.";
        let options = SegmentOptions::new(30).with_numbering(true);
        let segments = SegmentingGenerator.generate(text, &options).await?;

        assert!(segments.len() > 1);
        for seg in &segments {
            assert!(seg.length <= 30);
            assert!(seg.text.ends_with(&seg.numbering_suffix()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_segmenting_generator_rejects_blank_text() {
        let result = SegmentingGenerator
            .generate("   ", &SegmentOptions::new(280))
            .await;
        assert!(result.is_err());
    }
}
