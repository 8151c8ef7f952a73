//! BLE integration tests for the RemoteLed firmware.
//!
//! Requires a flashed device advertising as "RemoteLed". Exercises the
//! command/response protocol end to end over a real BLE link, including
//! the silent-drop behaviour for invalid frames.

mod ble_client;
mod protocol;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use ble_client::BleClient;
use protocol::{
    build_command, parse_response, CMD_LED_OFF, CMD_LED_ON, COMMAND_FOOTER, CONFIRMATION_FOOTER,
};

#[derive(Parser)]
#[command(name = "ble-tests")]
#[command(about = "BLE integration tests for RemoteLed")]
struct Args {
    /// BLE device name to scan for
    #[arg(long, default_value = "RemoteLed")]
    ble_name: String,

    /// BLE scan timeout in seconds
    #[arg(long, default_value = "10")]
    scan_timeout: u64,

    /// Per-command response timeout in milliseconds
    #[arg(long, default_value = "2000")]
    response_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let timeout = Duration::from_millis(args.response_timeout);

    println!("{}", "RemoteLed BLE Integration Tests".bold());
    println!("Scanning for \"{}\"...", args.ble_name);

    let device =
        BleClient::connect_by_name(&args.ble_name, Duration::from_secs(args.scan_timeout)).await?;
    println!("{}", "  Connected!".green());

    device.clear_notifications().await;

    println!("\n{}", "Running tests...".bold());
    println!();

    let mut passed = 0;
    let mut failed = 0;

    // Test 1: LED on confirms [1,1]
    print!("  Test 1: LED on confirms [1,1] ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(expect_confirmation(&device, CMD_LED_ON, timeout).await, &mut passed, &mut failed);

    // Test 2: LED on again is idempotent (same confirmation, no error)
    print!("  Test 2: LED on again (idempotent) ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(expect_confirmation(&device, CMD_LED_ON, timeout).await, &mut passed, &mut failed);

    // Test 3: LED off confirms [2,1]
    print!("  Test 3: LED off confirms [2,1] ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(expect_confirmation(&device, CMD_LED_OFF, timeout).await, &mut passed, &mut failed);

    // Test 4: unknown command code is dropped silently
    print!("  Test 4: Unknown code is silent ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(
        expect_silence(&device, build_command(0x03, COMMAND_FOOTER), timeout).await,
        &mut passed,
        &mut failed,
    );

    // Test 5: bad footer is dropped silently
    print!("  Test 5: Bad footer is silent ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(
        expect_silence(&device, build_command(CMD_LED_ON, 0x00), timeout).await,
        &mut passed,
        &mut failed,
    );

    // Test 6: on/off sequence, response characteristic retains the last confirmation
    print!("  Test 6: On/off sequence ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    report(test_on_off_sequence(&device, timeout).await, &mut passed, &mut failed);

    // Test 7: device re-advertises after a disconnect; LED state and the
    // stored confirmation survive
    print!("  Test 7: Re-advertises after disconnect ... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let device = match test_reconnect(
        device,
        &args.ble_name,
        Duration::from_secs(args.scan_timeout),
        timeout,
    )
    .await
    {
        Ok(d) => {
            println!("{}", "PASS".green().bold());
            passed += 1;
            Some(d)
        }
        Err(e) => {
            println!("{}", "FAIL".red().bold());
            println!("    {}", e.to_string().red());
            failed += 1;
            None
        }
    };

    println!();
    println!(
        "{}: {} passed, {} failed",
        "Results".bold(),
        passed.to_string().green(),
        failed.to_string().red()
    );

    if let Some(device) = device {
        device.disconnect().await?;
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: anyhow::Result<()>, passed: &mut u32, failed: &mut u32) {
    match result {
        Ok(()) => {
            println!("{}", "PASS".green().bold());
            *passed += 1;
        }
        Err(e) => {
            println!("{}", "FAIL".red().bold());
            println!("    {}", e.to_string().red());
            *failed += 1;
        }
    }
}

/// Send a valid command and check the notified confirmation echoes its code.
async fn expect_confirmation(
    device: &BleClient,
    code: u8,
    timeout: Duration,
) -> anyhow::Result<()> {
    device.clear_notifications().await;
    device
        .write_command(&build_command(code, COMMAND_FOOTER))
        .await?;

    let frame = device
        .wait_for_notification(timeout)
        .await
        .ok_or_else(|| anyhow::anyhow!("No confirmation received"))?;

    let (resp_code, footer) = parse_response(&frame)?;
    if resp_code != code || footer != CONFIRMATION_FOOTER {
        anyhow::bail!(
            "Got [{}, {}], expected [{}, {}]",
            resp_code,
            footer,
            code,
            CONFIRMATION_FOOTER
        );
    }
    Ok(())
}

/// Send an invalid frame and check the firmware stays silent.
async fn expect_silence(
    device: &BleClient,
    frame: [u8; 2],
    timeout: Duration,
) -> anyhow::Result<()> {
    device.clear_notifications().await;
    device.write_command(&frame).await?;

    if let Some(unexpected) = device.wait_for_notification(timeout).await {
        anyhow::bail!("Expected silence, got {:?}", unexpected);
    }
    Ok(())
}

/// Disconnect, re-scan, reconnect: the firmware must re-advertise after
/// every disconnection, and neither the LED state nor the stored
/// confirmation is reset by the link dropping.
async fn test_reconnect(
    device: BleClient,
    name: &str,
    scan_timeout: Duration,
    timeout: Duration,
) -> anyhow::Result<BleClient> {
    // Leave a known confirmation behind
    expect_confirmation(&device, CMD_LED_ON, timeout).await?;
    device.disconnect().await?;

    // A fresh scan only finds the device if it went back to advertising
    let device = BleClient::connect_by_name(name, scan_timeout).await?;

    // The response characteristic still holds the pre-disconnect confirmation
    let value = device.read_response().await?;
    let (code, footer) = parse_response(&value)?;
    if code != CMD_LED_ON || footer != CONFIRMATION_FOOTER {
        anyhow::bail!(
            "After reconnect characteristic holds [{}, {}], expected [{}, {}]",
            code,
            footer,
            CMD_LED_ON,
            CONFIRMATION_FOOTER
        );
    }

    // Commands still round-trip on the new connection
    expect_confirmation(&device, CMD_LED_OFF, timeout).await?;
    Ok(device)
}

/// Full scenario: on then off, confirmations in order, characteristic
/// readable afterwards.
async fn test_on_off_sequence(device: &BleClient, timeout: Duration) -> anyhow::Result<()> {
    expect_confirmation(device, CMD_LED_ON, timeout).await?;
    expect_confirmation(device, CMD_LED_OFF, timeout).await?;

    let value = device.read_response().await?;
    let (code, footer) = parse_response(&value)?;
    if code != CMD_LED_OFF || footer != CONFIRMATION_FOOTER {
        anyhow::bail!(
            "Response characteristic holds [{}, {}], expected [{}, {}]",
            code,
            footer,
            CMD_LED_OFF,
            CONFIRMATION_FOOTER
        );
    }
    Ok(())
}
