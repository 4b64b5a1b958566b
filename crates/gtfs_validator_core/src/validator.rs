use crate::{GtfsFeed, NoticeContainer};

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, feed: &GtfsFeed, notices: &mut NoticeContainer);
}

/// Runs a fixed list of validators in registration order.
#[derive(Default)]
pub struct ValidatorRunner {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorRunner {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn register<V>(&mut self, validator: V)
    where
        V: Validator + 'static,
    {
        self.validators.push(Box::new(validator));
    }

    pub fn run(&self, feed: &GtfsFeed) -> NoticeContainer {
        let mut notices = NoticeContainer::new();
        for validator in &self.validators {
            let before = notices.len();
            validator.validate(feed, &mut notices);
            tracing::debug!(
                validator = validator.name(),
                notices = notices.len() - before,
                "validator finished"
            );
        }
        notices
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoticeSeverity, ValidationNotice};

    struct Fixed(&'static str);

    impl Validator for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn validate(&self, _feed: &GtfsFeed, notices: &mut NoticeContainer) {
            notices.push(ValidationNotice::new(self.0, NoticeSeverity::Info, ""));
        }
    }

    #[test]
    fn runs_validators_in_registration_order() {
        let mut runner = ValidatorRunner::new();
        assert!(runner.is_empty());
        runner.register(Fixed("first"));
        runner.register(Fixed("second"));

        let notices = runner.run(&GtfsFeed::default());
        let codes: Vec<&str> = notices.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["first", "second"]);
    }
}
