use std::{env, io, process::ExitCode};

use scripts::{connect, init_logging, parse_args, report_failure, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args(env::args_os(), &mut io::stdout(), &mut io::stderr()) {
        Ok(args) => args,
        Err(code) => return ExitCode::from(code),
    };
    init_logging(args.debug);

    let mut deployer = match connect(&args).await {
        Ok(deployer) => deployer,
        Err(e) => return ExitCode::from(report_failure(&mut io::stderr(), &e)),
    };

    let network = match &args.rpc_url {
        Some(url) => url.clone(),
        None => args.network.to_string(),
    };
    let code = run(
        &mut deployer,
        &network,
        &mut io::stdout().lock(),
        &mut io::stderr(),
    )
    .await;

    ExitCode::from(code)
}
