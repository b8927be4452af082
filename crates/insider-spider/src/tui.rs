use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Total / success / failure bars for one batch; hidden outside tui mode.
#[derive(Clone, Debug)]
pub(crate) struct BatchProgress {
    // owns the draw target; the bars stop rendering once it drops
    _multi: Option<MultiProgress>,
    pub(crate) total: ProgressBar,
    pub(crate) success: ProgressBar,
    pub(crate) fails: ProgressBar,
}

impl BatchProgress {
    pub(crate) fn new(len: usize, msg: &str, tui: bool) -> Self {
        if !tui {
            return Self::hidden();
        }
        match Self::multi_progress(len, msg) {
            Ok(progress) => progress,
            Err(err) => {
                tracing::debug!("failed to style progress bars, error({err})");
                Self::hidden()
            }
        }
    }

    fn hidden() -> Self {
        Self {
            _multi: None,
            total: ProgressBar::hidden(),
            success: ProgressBar::hidden(),
            fails: ProgressBar::hidden(),
        }
    }

    fn multi_progress(len: usize, msg: &str) -> Result<Self, indicatif::style::TemplateError> {
        // overall multi progress bar
        let multi = MultiProgress::new();

        // total number of units to collect
        let total = multi.add(
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.magenta}\n \
                        {msg:>9.white} |{bar:57.white/grey}| {pos:<2} / {human_len} \
                        ({percent_precise}%) [Time: {elapsed}, Rate: {per_sec}, ETA: {eta}]",
                    )?
                    .progress_chars("## "),
            ),
        );
        total.set_message(msg.to_string());
        total.enable_steady_tick(Duration::from_millis(100));

        // total successful collections
        let success = multi.insert_after(
            &total,
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(" {msg:>9.green} |{bar:57.green}| {pos:<2.green}")?
                    .progress_chars("## "),
            ),
        );
        success.set_message("successes");

        // total failed collections
        let fails = multi.insert_after(
            &success,
            ProgressBar::new(len as u64).with_style(
                ProgressStyle::default_bar()
                    .template(" {msg:>9.red} |{bar:57.red}| {pos:<2.red}")?
                    .progress_chars("## "),
            ),
        );
        fails.set_message("failures");

        Ok(Self {
            _multi: Some(multi),
            total,
            success,
            fails,
        })
    }

    pub(crate) fn succeeded(&self) {
        self.success.inc(1);
        self.total.inc(1);
    }

    pub(crate) fn failed(&self) {
        self.fails.inc(1);
        self.total.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.total.finish_and_clear();
        self.success.finish_and_clear();
        self.fails.finish_and_clear();
    }
}
