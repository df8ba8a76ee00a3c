use std::{
    fs::File,
    io::{self, BufWriter, Write as _},
    process::ExitCode,
};

use clap::Parser;
use log::{error, info};

use stack_analyzer::{
    error::Result,
    options::Options,
    output::DotConf,
    Error,
    State,
};



fn run(opts: &Options) -> Result<()>
{
    let (mut state, tools) = State::from_options(opts)?;
    info!("analyzing {:?} as {}", opts.elf_path, state.arch);

    let disassembly = tools.disassemble()?;
    state.analyze(&disassembly)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    state.output_report(&mut out)?;
    out.flush()?;

    if let Some(path) = &opts.dot
    {
        let file = File::create(path).map_err(|e| Error::Io(path.clone(), e))?;
        let mut writer = BufWriter::new(file);
        state.output_dot(&mut writer, DotConf::default())?;
        writer.flush()?;
        info!("call graph written to {:?}", path);
    }

    Ok(())
}


fn main() -> ExitCode
{
    let opts = Options::parse();

    // RUST_LOG wins over -v
    let _logger = match flexi_logger::Logger::try_with_env_or_str(opts.log_spec())
        .and_then(|logger| logger.start())
    {
        Ok(handle) => Some(handle),
        Err(e) =>
        {
            eprintln!("logger unavailable: {}", e);
            None
        },
    };

    match run(&opts)
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) =>
        {
            error!("{:?}", e);
            println!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
