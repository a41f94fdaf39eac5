//! Channel resolution by display name.

use crate::client::Channel;
use crate::error::{Error, Result};

/// Find the dialog whose title exactly matches `title` (case-sensitive).
///
/// This is a startup-time check: an unknown title is a configuration error,
/// and so is a duplicated one, since picking either dialog silently would
/// forward to the wrong place half the time.
pub fn resolve<'a>(channels: &'a [Channel], title: &str) -> Result<&'a Channel> {
    let mut matches = channels.iter().filter(|c| c.title == title);

    let found = matches
        .next()
        .ok_or_else(|| Error::ChannelNotFound(title.to_string()))?;
    if matches.next().is_some() {
        return Err(Error::AmbiguousChannel(title.to_string()));
    }
    Ok(found)
}
