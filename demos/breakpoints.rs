use clap::Parser;
use log::info;

use piecewise_rs::backend::{Backend, SatResult};
use piecewise_rs::expr::Real;
use piecewise_rs::minmax::max;
use piecewise_rs::model::Model;
use piecewise_rs::piecewise::Piecewise;

/// Tiered pricing: the unit price drops at every breakpoint.
#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Quantities at which the next tier starts (ascending).
    #[arg(long, value_name = "INT", value_delimiter = ',', default_value = "10,100")]
    breaks: Vec<i64>,

    /// Unit price in each tier, one more than the breakpoints.
    #[arg(long, value_name = "INT", value_delimiter = ',', default_value = "5,4,3")]
    prices: Vec<i64>,

    /// Ordered quantity.
    #[arg(value_name = "INT", default_value = "42")]
    quantity: i64,

    /// Budget to stay within.
    #[clap(long, value_name = "INT")]
    budget: Option<i64>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let model = Model::default();
    let quantity = model.new_real("quantity");
    let shipping = model.new_real("shipping");

    let price = Piecewise::from_breakpoints(
        &model,
        "price",
        &quantity,
        args.breaks.iter().copied(),
        args.prices.iter().copied().map(Some),
    )?;
    price.verify(None)?;
    info!("price tiers are exclusive and exhaustive");

    let unit_price = price.val();
    let cost = &price * &quantity;
    // Shipping is free for large orders, but never negative.
    let shipping_fee = max(&model, &[Real::from(20) - &quantity, Real::from(0)])?;
    model.add(shipping.eq_to(shipping_fee));
    let total = &cost + &shipping;

    model.add(quantity.eq_to(args.quantity));
    if let Some(budget) = args.budget {
        model.add(total.le(budget));
    }

    println!("{}", model.to_smt2());

    let res = model.check();
    println!("check = {}", res);
    if res == SatResult::Sat {
        if let Some(assignment) = model.model() {
            println!("unit price = {}", assignment.eval_real(&unit_price));
            println!("cost = {}", assignment.eval_real(&cost));
            println!("shipping = {}", assignment.eval_real(&shipping));
            println!("total = {}", assignment.eval_real(&total));
        }
    }
    println!("statistics = {:?}", model.statistics());

    let time_total = time_total.elapsed();
    println!("\nAll done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
