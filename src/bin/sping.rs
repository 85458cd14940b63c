#[macro_use]
extern crate log;

use std::{process::ExitCode, sync::Arc};

use sping::{
    configuration::{Command, Configuration, EchoOptions, Parser, ServeOptions},
    connection::{connect, EchoService},
    report::{LogReporter, Reporter, SilentReporter},
    sequence::SequenceTracker,
    PingClient, PingServer,
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let conf = Configuration::parse();
    if let Err(e) = conf.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let reporter: Arc<dyn Reporter> = if conf.quiet {
        Arc::new(SilentReporter)
    } else {
        Arc::new(LogReporter)
    };

    let result = match conf.command {
        Command::Serve(ref serve) => run_server(serve, reporter).await,
        Command::Echo(ref echo) => run_client(echo, reporter).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    options: &ServeOptions,
    reporter: Arc<dyn Reporter>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tracker = match options.idle_timeout() {
        Some(timeout) => SequenceTracker::with_idle_timeout(timeout),
        None => SequenceTracker::new(),
    };

    let addr = (std::net::Ipv4Addr::UNSPECIFIED, options.port).into();
    let bound = PingServer::new(tracker, reporter)
        .bind(addr, &options.credentials())
        .await?;

    let handle = bound.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutting down!");
        handle.shutdown();
    });

    bound.run().await?;
    Ok(())
}

async fn run_client(
    options: &EchoOptions,
    reporter: Arc<dyn Reporter>,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = options.sender_name()?;
    let target = options.target();

    let mut connection = connect(&options.credentials(), &target).await?;
    info!(
        "Pinging {} as {} ({}, {} pings every {:?})",
        connection.target(),
        name,
        connection.mode(),
        options.limit,
        options.delay()
    );

    let mut client = PingClient::new(name, options.delay(), options.limit).with_reporter(reporter);

    tokio::select! {
        stats = client.run(&mut connection) => {
            let stats = stats?;
            connection.close().await?;
            stats.print(options.format);
        }
        _ = shutdown_signal() => {
            info!("shutting down!");
        }
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
