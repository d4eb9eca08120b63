use clap::{App, Arg, SubCommand};
use kestrel::{config, define_topic, Broker, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

define_topic!(DEMO_RATES, 0, "demo_rates", 8);

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("kestrel-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Kestrel Topic Broker CLI Tool")
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run a publisher/subscriber demo on one topic")
                .arg(
                    Arg::with_name("rate")
                        .short("r")
                        .long("rate")
                        .value_name("HZ")
                        .help("Publish rate in Hz")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("How long to run")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("depth")
                        .short("q")
                        .long("depth")
                        .value_name("SLOTS")
                        .help("Queue depth for the demo topic")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Print broker configuration limits"))
        .get_matches();

    match matches.subcommand() {
        ("demo", Some(sub)) => {
            let rate: u64 = sub.value_of("rate").unwrap_or("1000").parse().unwrap_or(1000);
            let duration: u64 = sub.value_of("duration").unwrap_or("2").parse().unwrap_or(2);
            let depth: usize = sub.value_of("depth").unwrap_or("8").parse().unwrap_or(8);
            run_demo(rate, duration, depth)
        }
        ("info", _) => {
            println!("kestrel {}", kestrel::VERSION);
            println!("max instances per topic: {}", config::MAX_INSTANCES);
            println!("queue depth cap:         {}", config::MAX_QUEUE_SIZE);
            println!("default queue depth:     {}", config::DEFAULT_QUEUE_SIZE);
            Ok(())
        }
        _ => {
            eprintln!("No subcommand given; try 'demo' or 'info'");
            Ok(())
        }
    }
}

fn run_demo(rate: u64, duration_secs: u64, depth: usize) -> Result<()> {
    let broker = Arc::new(Broker::new(4));
    let running = Arc::new(AtomicBool::new(true));

    let advert = broker.advertise(&DEMO_RATES, None, depth)?;
    println!(
        "publishing '{}' at {} Hz for {} s (depth {})",
        DEMO_RATES.name,
        rate,
        duration_secs,
        advert.queue_size()
    );

    let publisher = {
        let running = running.clone();
        thread::spawn(move || {
            let period = Duration::from_nanos(1_000_000_000 / rate.max(1));
            let mut sequence: u64 = 0;
            while running.load(Ordering::Relaxed) {
                sequence += 1;
                advert.publish(&sequence.to_le_bytes()).ok();
                thread::sleep(period);
            }
            (advert, sequence)
        })
    };

    let subscriber = {
        let broker = broker.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut sub = broker.subscribe(&DEMO_RATES).unwrap();
            let mut dst = [0u8; 8];
            let mut received: u64 = 0;
            while running.load(Ordering::Relaxed) {
                while sub.updated(&broker) {
                    if sub.copy(&broker, &mut dst).unwrap_or(0) > 0 {
                        received += 1;
                    }
                }
                thread::sleep(Duration::from_micros(200));
            }
            broker.unsubscribe(sub);
            received
        })
    };

    let start = Instant::now();
    thread::sleep(Duration::from_secs(duration_secs));
    running.store(false, Ordering::Relaxed);

    let (advert, published) = publisher.join().expect("publisher thread panicked");
    let received = subscriber.join().expect("subscriber thread panicked");
    broker.unadvertise(advert);

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "published {} msgs, received {} msgs in {:.2} s ({:.0} msg/s)",
        published,
        received,
        elapsed,
        received as f64 / elapsed
    );
    println!("stats: {:#?}", broker.stats().snapshot());

    Ok(())
}
