mod args;

use anyhow::Result;
use flame_sort::{cli::init_logger, manifest::LOG_FILE_NAME, Sorter};

use crate::args::Args;

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    init_logger(args.verbose);

    let sorter = Sorter::new(args.config);
    let summary = sorter.run()?;

    eprintln!("{}", summary);
    eprintln!(
        "Log written to {}",
        sorter.config().output.join(LOG_FILE_NAME).display()
    );
    Ok(())
}
