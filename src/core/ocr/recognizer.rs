use super::error::DetectError;
use crate::match_reader::template::LABEL_CHARSET;
use image::GrayImage;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 识别角色：标签（比赛名称）与倒计时各用一组识别器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecognizerRole {
    Label,
    Countdown,
}

/// Page layout the engine should assume for a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutHint {
    SingleLine,
    SingleWord,
}

impl RecognizerRole {
    pub fn allow_list(&self) -> &'static str {
        match self {
            RecognizerRole::Label => LABEL_CHARSET.as_str(),
            RecognizerRole::Countdown => "0123456789",
        }
    }

    pub fn layout(&self) -> LayoutHint {
        match self {
            RecognizerRole::Label => LayoutHint::SingleLine,
            RecognizerRole::Countdown => LayoutHint::SingleWord,
        }
    }
}

impl fmt::Display for RecognizerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerRole::Label => f.write_str("label"),
            RecognizerRole::Countdown => f.write_str("countdown"),
        }
    }
}

/// A stateful text recognizer bound to one role.
///
/// Lifecycle: created by a [`RecognizerFactory`], then `step` any number of
/// times, optionally `reset` between steps, and disposed on drop.
pub trait Recognizer: Send {
    fn step(&mut self, raster: &GrayImage) -> Result<String, DetectError>;

    /// Clear adaptive state learned from earlier rasters.
    fn reset(&mut self);
}

pub trait RecognizerFactory: Send + Sync {
    /// Build a recognizer configured with `role.allow_list()` and `role.layout()`.
    fn create(&self, role: RecognizerRole) -> Result<Box<dyn Recognizer>, DetectError>;
}

type ReadFn = Arc<dyn Fn(&GrayImage) -> String + Send + Sync>;

pub struct MockRecognizer {
    read: ReadFn,
    calls: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
}

impl Recognizer for MockRecognizer {
    fn step(&mut self, raster: &GrayImage) -> Result<String, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.read)(raster))
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// 模拟识别器工厂，按角色返回固定文本或由闭包计算
pub struct MockRecognizerFactory {
    label: ReadFn,
    countdown: ReadFn,
    calls: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    fail_create: AtomicBool,
}

impl MockRecognizerFactory {
    pub fn fixed(label: &str, countdown: &str) -> Self {
        let label = label.to_string();
        let countdown = countdown.to_string();
        Self::with_readers(move |_| label.clone(), move |_| countdown.clone())
    }

    pub fn with_readers<L, C>(label: L, countdown: C) -> Self
    where
        L: Fn(&GrayImage) -> String + Send + Sync + 'static,
        C: Fn(&GrayImage) -> String + Send + Sync + 'static,
    {
        Self {
            label: Arc::new(label),
            countdown: Arc::new(countdown),
            calls: Arc::new(AtomicUsize::new(0)),
            resets: Arc::new(AtomicUsize::new(0)),
            created: Arc::new(AtomicUsize::new(0)),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_create.store(failing, Ordering::SeqCst);
    }

    /// Total `step` calls across every handle this factory built.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl RecognizerFactory for MockRecognizerFactory {
    fn create(&self, role: RecognizerRole) -> Result<Box<dyn Recognizer>, DetectError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DetectError::CreateFailed(format!("mock {} recognizer", role)));
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let read = match role {
            RecognizerRole::Label => Arc::clone(&self.label),
            RecognizerRole::Countdown => Arc::clone(&self.countdown),
        };
        Ok(Box::new(MockRecognizer {
            read,
            calls: Arc::clone(&self.calls),
            resets: Arc::clone(&self.resets),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_metadata() {
        assert_eq!(RecognizerRole::Countdown.allow_list(), "0123456789");
        assert_eq!(RecognizerRole::Countdown.layout(), LayoutHint::SingleWord);
        assert_eq!(RecognizerRole::Label.layout(), LayoutHint::SingleLine);

        let labels = RecognizerRole::Label.allow_list();
        assert!(labels.starts_with(' '));
        for c in "0123456789QualificationSemiTestMatchFk".chars() {
            assert!(labels.contains(c), "missing {:?}", c);
        }
    }

    #[test]
    fn test_mock_factory_counts_calls() {
        let factory = MockRecognizerFactory::fixed("Final 1", "42");
        let mut label = factory.create(RecognizerRole::Label).unwrap();
        let mut countdown = factory.create(RecognizerRole::Countdown).unwrap();
        let raster = GrayImage::new(4, 4);

        assert_eq!(label.step(&raster).unwrap(), "Final 1");
        assert_eq!(countdown.step(&raster).unwrap(), "42");
        countdown.reset();

        assert_eq!(factory.calls(), 2);
        assert_eq!(factory.resets(), 1);
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn test_mock_factory_failure() {
        let factory = MockRecognizerFactory::fixed("", "");
        factory.set_failing(true);
        assert!(matches!(
            factory.create(RecognizerRole::Label),
            Err(DetectError::CreateFailed(_))
        ));
    }
}
