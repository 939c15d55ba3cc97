use std::sync::Arc;
use std::time::Duration;

use daikin_one::{Credentials, DaikinOne, Equipment};

#[tokio::main]
async fn main() -> daikin_one::Result<()> {
    tracing_subscriber::fmt::init();

    let credentials = Credentials::from_env().expect("set DAIKIN_EMAIL and DAIKIN_PASSWORD");
    let client = Arc::new(DaikinOne::builder(credentials).build()?);

    if !client.login().await {
        eprintln!("Login failed, check credentials");
        return Ok(());
    }
    println!("Logged in. Polling for updates...");

    loop {
        if let Err(e) = client.update(false).await {
            eprintln!("Update error: {e}");
            tokio::time::sleep(Duration::from_secs(5)).await;
            continue;
        }

        for thermostat in client.thermostats().values() {
            let location = client
                .location(&thermostat.location_id)
                .map(|l| l.name)
                .unwrap_or_default();
            println!(
                "[{location} / {}] {:.1}\u{00b0}C / {:.1}\u{00b0}F {}% | mode: {:?} | status: {:?} | heat {} / cool {} | fan: {:?} {:?}",
                thermostat.name,
                thermostat.indoor_temperature.celsius(),
                thermostat.indoor_temperature.fahrenheit(),
                thermostat.indoor_humidity,
                thermostat.mode,
                thermostat.status,
                thermostat.set_point_heat,
                thermostat.set_point_cool,
                thermostat.fan_mode,
                thermostat.fan_speed,
            );
            if let Some(outdoor) = thermostat.outdoor_temperature {
                println!(
                    "  Outdoor: {:.1}\u{00b0}C / {:.1}\u{00b0}F",
                    outdoor.celsius(),
                    outdoor.fahrenheit(),
                );
            }
            for equipment in thermostat.equipment.values() {
                match equipment {
                    Equipment::IndoorUnit(u) => println!(
                        "  {} ({}): airflow {} cfm, fan {}%, heat {}%, {} W",
                        u.name, u.model, u.current_airflow, u.fan_demand_current_percent,
                        u.heat_demand_current_percent, u.power_usage,
                    ),
                    Equipment::OutdoorUnit(u) => println!(
                        "  {} ({}): compressor {} rps, fan {} rpm, air {}, {} W",
                        u.name, u.model, u.compressor_speed_current, u.outdoor_fan_rpm,
                        u.air_temperature, u.power_usage,
                    ),
                    Equipment::EevCoil(c) => println!(
                        "  {} ({}): {} psi, superheat {}, subcool {}",
                        c.name, c.model, c.pressure_psi, c.indoor_superheat_temperature,
                        c.liquid_subcool_temperature,
                    ),
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
