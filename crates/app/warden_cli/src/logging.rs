pub mod formats;

use flexi_logger::Logger;

use crate::Error;

pub fn init() -> Result<(), Error> {
    // stdout is reserved for command output
    Logger::try_with_env_or_str("info")?
        .format(formats::cli_format)
        .log_to_stderr()
        .start()?;

    Ok(())
}
