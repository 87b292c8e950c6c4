use log::LevelFilter;

pub use crate::traits::Progress;

impl Progress for indicatif::ProgressBar {
    fn inc(&self, i: u64) {
        indicatif::ProgressBar::inc(self, i)
    }

    fn finish(&self) {
        indicatif::ProgressBar::finish(self)
    }
}

impl Progress for logbar::ProgressBar {
    fn inc(&self, i: u64) {
        logbar::ProgressBar::inc(self, i as usize)
    }

    fn finish(&self) {
        logbar::ProgressBar::finish(self)
    }
}

/// Dummy progress indicator
pub struct NoProgress {}
impl Progress for NoProgress {
    fn inc(&self, _i: u64) {}

    fn finish(&self) {}
}

/// Don't show any progress indicator
pub const NO_PROGRESS: NoProgress = NoProgress {};

/// Progress over a number of output files or steps
///
/// On an interactive terminal this is an `indicatif` bar, otherwise a
/// `logbar` bar. Nothing is shown unless the log level is exactly
/// `info`, so that debug output is never garbled. While a bar is
/// shown, logging is switched off and restored by [Progress::finish].
pub struct ProgressBar {
    bar: Box<dyn Progress + Send + Sync>,
    restore_level: Option<LevelFilter>,
}

impl Default for ProgressBar {
    fn default() -> Self {
        Self {
            bar: Box::new(NO_PROGRESS),
            restore_level: None,
        }
    }
}

impl Progress for ProgressBar {
    fn inc(&self, i: u64) {
        self.bar.inc(i);
    }

    fn finish(&self) {
        self.bar.finish();
        if let Some(level) = self.restore_level {
            log::set_max_level(level);
        }
    }
}

impl ProgressBar {
    /// A new progress bar with the given number of steps and message
    pub fn new(len: u64, message: &str) -> Self {
        let level = log::max_level();
        if level != LevelFilter::Info {
            return ProgressBar::default();
        }
        let bar: Box<dyn Progress + Send + Sync> =
            if console::Term::stderr().features().is_attended() {
                Box::new(indicatif_bar(len, message))
            } else {
                eprintln!("{message}");
                let style = logbar::Style::new().indicator('█');
                Box::new(logbar::ProgressBar::with_style(len as usize, style))
            };
        log::set_max_level(LevelFilter::Off);
        ProgressBar {
            bar,
            restore_level: Some(level),
        }
    }
}

fn indicatif_bar(len: u64, message: &str) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(len);
    if let Ok(style) = indicatif::ProgressStyle::default_bar()
        .template("{bar:60.cyan/cyan} {msg} {pos}/{len} [{elapsed}]")
    {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar
}
