//! Command tokenizer and parser.
//!
//! Tokens are whitespace-delimited; the first token is the verb and a
//! leading slash is tolerated. An inline `-y` marker anywhere in the
//! input pre-confirms the command.

use crate::error::{CommandError, CommandResult};
use rust_decimal::Decimal;
use shaper_core::{LiquidityTrend, MmPolicy, OrderSide, Pair, PwAction, PwPolicy, PwSourceSpec};
use std::str::FromStr;

const USAGE_START: &str = "Usage: start mm [optimal|spread|depth]";
const USAGE_STOP: &str = "Usage: stop mm";
const USAGE_ENABLE: &str =
    "Usage: enable ob [count] [pct%] | enable liq <spread%> <a1> <c1> <a2> <c2> [trend] | enable pw <low-high coin | dev%> [pair@exchange] [smart|strict] [fill|prevent]";
const USAGE_DISABLE: &str = "Usage: disable ob|liq|pw";
const USAGE_AMOUNT: &str = "Usage: amount <min>-<max>";
const USAGE_INTERVAL: &str = "Usage: interval <min>-<max> sec|min|hour";
const USAGE_BUYPERCENT: &str = "Usage: buypercent <0..100>";
const USAGE_CLEAR: &str =
    "Usage: clear [pair] <purpose|all|unk> [buy|sell] [>P coin | <P coin] [force]";
const USAGE_FILL: &str =
    "Usage: fill [pair] buy|sell quote=X|amount=X low=L high=H count=N";
const USAGE_BUY_SELL: &str = "Usage: buy|sell [pair] amount=X|quote=X [price=P|market]";
const USAGE_MAKE: &str = "Usage: make price <target> [coin] now";
const USAGE_CALC: &str = "Usage: calc <amount> <from> <to>";
const USAGE_DEPOSIT: &str = "Usage: deposit <coin>";

/// A named subsystem for enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Ob,
    Liq,
    Pw,
}

impl FromStr for Subsystem {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ob" => Ok(Self::Ob),
            "liq" => Ok(Self::Liq),
            "pw" => Ok(Self::Pw),
            other => Err(CommandError::Validation(format!(
                "Unknown subsystem '{other}'. {USAGE_DISABLE}"
            ))),
        }
    }
}

/// Clear-command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    All,
    /// Exchange-live orders absent from the ledger.
    Unknown,
    Purpose(shaper_core::Purpose),
}

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        policy: Option<MmPolicy>,
    },
    Stop,
    EnableOb {
        count: Option<u32>,
        max_order_percent: Option<Decimal>,
    },
    EnableLiq {
        spread_percent: Decimal,
        sell_amount: Decimal,
        sell_coin: String,
        buy_amount: Decimal,
        buy_coin: String,
        trend: Option<LiquidityTrend>,
    },
    EnablePw {
        source: PwSourceSpec,
        deviation_percent: Decimal,
        policy: Option<PwPolicy>,
        action: Option<PwAction>,
    },
    Disable(Subsystem),
    Amount {
        min: Decimal,
        max: Decimal,
    },
    Interval {
        min_sec: u64,
        max_sec: u64,
    },
    BuyPercent(Decimal),
    Clear {
        pair: Option<Pair>,
        target: ClearTarget,
        side: Option<OrderSide>,
        /// `(is_above, price)` from `>P` / `<P`.
        price_filter: Option<(bool, Decimal)>,
        force: bool,
    },
    Fill {
        pair: Option<Pair>,
        side: OrderSide,
        quote: Option<Decimal>,
        amount: Option<Decimal>,
        low: Decimal,
        high: Decimal,
        count: u32,
    },
    Place {
        side: OrderSide,
        pair: Option<Pair>,
        amount: Option<Decimal>,
        quote: Option<Decimal>,
        /// `None` means a market order.
        price: Option<Decimal>,
    },
    Make {
        price: Decimal,
    },
    /// The `y` confirmation verb.
    Confirm,
    Rates,
    Stats,
    Orders,
    Balances,
    Params,
    Info,
    PairInfo,
    Calc {
        amount: Decimal,
        from: String,
        to: String,
    },
    Deposit {
        coin: String,
    },
    Account,
    Version,
    Help,
}

/// Parse result: the command plus whether an inline `-y` pre-confirmed it.
#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub command: Command,
    pub confirmed: bool,
}

/// Parse one line of operator input.
pub fn parse(input: &str) -> CommandResult<ParsedCommand> {
    let mut tokens: Vec<&str> = input.split_whitespace().collect();
    let confirmed = tokens.iter().any(|t| *t == "-y");
    tokens.retain(|t| *t != "-y");

    let verb = tokens
        .first()
        .map(|v| v.trim_start_matches('/').to_ascii_lowercase())
        .ok_or_else(|| CommandError::Validation("Empty command".to_string()))?;
    let args = &tokens[1..];

    let command = match verb.as_str() {
        "start" => parse_start(args)?,
        "stop" => {
            if args.first().copied() != Some("mm") {
                return Err(CommandError::Validation(USAGE_STOP.to_string()));
            }
            Command::Stop
        }
        "enable" => parse_enable(args)?,
        "disable" => {
            let sub = args
                .first()
                .ok_or_else(|| CommandError::Validation(USAGE_DISABLE.to_string()))?;
            Command::Disable(sub.parse()?)
        }
        "amount" => {
            let (min, max) = parse_range(
                args.first()
                    .ok_or_else(|| CommandError::Validation(USAGE_AMOUNT.to_string()))?,
                USAGE_AMOUNT,
            )?;
            Command::Amount { min, max }
        }
        "interval" => parse_interval(args)?,
        "buypercent" => {
            let pct: Decimal = args
                .first()
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| CommandError::Validation(USAGE_BUYPERCENT.to_string()))?;
            if pct < Decimal::ZERO || pct > Decimal::from(100) {
                return Err(CommandError::Validation(USAGE_BUYPERCENT.to_string()));
            }
            Command::BuyPercent(pct)
        }
        "clear" => parse_clear(args)?,
        "fill" => parse_fill(args)?,
        "buy" => parse_place(OrderSide::Buy, args)?,
        "sell" => parse_place(OrderSide::Sell, args)?,
        "make" => parse_make(args)?,
        "y" => Command::Confirm,
        "rates" => Command::Rates,
        "stats" => Command::Stats,
        "orders" => Command::Orders,
        "balances" => Command::Balances,
        "params" => Command::Params,
        "info" => Command::Info,
        "pair" => Command::PairInfo,
        "calc" => parse_calc(args)?,
        "deposit" => {
            let coin = args
                .first()
                .ok_or_else(|| CommandError::Validation(USAGE_DEPOSIT.to_string()))?;
            Command::Deposit {
                coin: coin.to_uppercase(),
            }
        }
        "account" => Command::Account,
        "version" => Command::Version,
        "help" => Command::Help,
        other => {
            return Err(CommandError::Validation(format!(
                "Unknown command '{other}'. Try help"
            )))
        }
    };

    Ok(ParsedCommand { command, confirmed })
}

fn parse_start(args: &[&str]) -> CommandResult<Command> {
    if args.first().copied() != Some("mm") {
        return Err(CommandError::Validation(USAGE_START.to_string()));
    }
    let policy = match args.get(1) {
        Some(p) => Some(
            p.parse::<MmPolicy>()
                .map_err(|_| CommandError::Validation(USAGE_START.to_string()))?,
        ),
        None => None,
    };
    Ok(Command::Start { policy })
}

fn parse_enable(args: &[&str]) -> CommandResult<Command> {
    let sub: Subsystem = args
        .first()
        .ok_or_else(|| CommandError::Validation(USAGE_ENABLE.to_string()))?
        .parse()?;
    let rest = &args[1..];
    match sub {
        Subsystem::Ob => {
            let count = match rest.first() {
                Some(c) => Some(c.parse::<u32>().map_err(|_| {
                    CommandError::Validation(USAGE_ENABLE.to_string())
                })?),
                None => None,
            };
            let max_order_percent = match rest.get(1) {
                Some(p) => Some(parse_percent(p, USAGE_ENABLE)?),
                None => None,
            };
            Ok(Command::EnableOb {
                count,
                max_order_percent,
            })
        }
        Subsystem::Liq => {
            if rest.len() < 5 {
                return Err(CommandError::Validation(USAGE_ENABLE.to_string()));
            }
            let spread_percent = parse_percent(rest[0], USAGE_ENABLE)?;
            let sell_amount = parse_decimal(rest[1], USAGE_ENABLE)?;
            let sell_coin = rest[2].to_uppercase();
            let buy_amount = parse_decimal(rest[3], USAGE_ENABLE)?;
            let buy_coin = rest[4].to_uppercase();
            let trend = match rest.get(5) {
                Some(t) => Some(
                    t.parse::<LiquidityTrend>()
                        .map_err(|_| CommandError::Validation(USAGE_ENABLE.to_string()))?,
                ),
                None => None,
            };
            Ok(Command::EnableLiq {
                spread_percent,
                sell_amount,
                sell_coin,
                buy_amount,
                buy_coin,
                trend,
            })
        }
        Subsystem::Pw => parse_enable_pw(rest),
    }
}

fn parse_enable_pw(rest: &[&str]) -> CommandResult<Command> {
    let first = rest
        .first()
        .ok_or_else(|| CommandError::Validation(USAGE_ENABLE.to_string()))?;

    let mut idx = 1;
    let (source, deviation_percent) = if first.contains('-') {
        // Numeric range: `low-high coin`
        let (low, high) = parse_range(first, USAGE_ENABLE)?;
        let coin = rest
            .get(idx)
            .ok_or_else(|| CommandError::Validation(USAGE_ENABLE.to_string()))?
            .to_uppercase();
        idx += 1;
        (PwSourceSpec::Range { low, high, coin }, Decimal::ZERO)
    } else if first.ends_with('%') {
        // Deviation around a market source: `dev% pair@exchange`
        let deviation = parse_percent(first, USAGE_ENABLE)?;
        let src = rest
            .get(idx)
            .ok_or_else(|| CommandError::Validation(USAGE_ENABLE.to_string()))?;
        idx += 1;
        let (pair, exchange) = src.split_once('@').ok_or_else(|| {
            CommandError::Validation(format!("Expected pair@exchange. {USAGE_ENABLE}"))
        })?;
        (
            PwSourceSpec::Market {
                pair: pair.to_string(),
                exchange: exchange.to_string(),
            },
            deviation,
        )
    } else {
        return Err(CommandError::Validation(USAGE_ENABLE.to_string()));
    };

    let mut policy = None;
    let mut action = None;
    for token in &rest[idx..] {
        if let Ok(p) = token.parse::<PwPolicy>() {
            policy = Some(p);
        } else if let Ok(a) = token.parse::<PwAction>() {
            action = Some(a);
        } else {
            return Err(CommandError::Validation(USAGE_ENABLE.to_string()));
        }
    }
    Ok(Command::EnablePw {
        source,
        deviation_percent,
        policy,
        action,
    })
}

fn parse_interval(args: &[&str]) -> CommandResult<Command> {
    let (min, max) = parse_range(
        args.first()
            .ok_or_else(|| CommandError::Validation(USAGE_INTERVAL.to_string()))?,
        USAGE_INTERVAL,
    )?;
    let unit = args
        .get(1)
        .ok_or_else(|| CommandError::Validation(USAGE_INTERVAL.to_string()))?;
    let factor = match unit.to_ascii_lowercase().as_str() {
        "sec" => 1u64,
        "min" => 60,
        "hour" => 3600,
        _ => return Err(CommandError::Validation(USAGE_INTERVAL.to_string())),
    };
    let to_secs = |d: Decimal| -> CommandResult<u64> {
        use rust_decimal::prelude::ToPrimitive;
        d.to_u64()
            .map(|v| v * factor)
            .ok_or_else(|| CommandError::Validation(USAGE_INTERVAL.to_string()))
    };
    let min_sec = to_secs(min)?;
    let max_sec = to_secs(max)?;
    if min_sec == 0 || min_sec > max_sec {
        return Err(CommandError::Validation(USAGE_INTERVAL.to_string()));
    }
    Ok(Command::Interval { min_sec, max_sec })
}

fn parse_clear(args: &[&str]) -> CommandResult<Command> {
    let mut pair = None;
    let mut target = None;
    let mut side = None;
    let mut price_filter = None;
    let mut force = false;

    let mut iter = args.iter().peekable();
    while let Some(token) = iter.next() {
        let lower = token.to_ascii_lowercase();
        if lower == "force" {
            force = true;
        } else if lower == "all" {
            target = Some(ClearTarget::All);
        } else if lower == "unk" {
            target = Some(ClearTarget::Unknown);
        } else if let Ok(purpose) = lower.parse::<shaper_core::Purpose>() {
            target = Some(ClearTarget::Purpose(purpose));
        } else if let Ok(parsed_side) = lower.parse::<OrderSide>() {
            side = Some(parsed_side);
        } else if let Some(price) = token.strip_prefix('>') {
            price_filter = Some((true, parse_decimal(price, USAGE_CLEAR)?));
            // Optional coin token after the filter
            if iter.peek().map(|t| t.chars().all(char::is_alphabetic)) == Some(true) {
                iter.next();
            }
        } else if let Some(price) = token.strip_prefix('<') {
            price_filter = Some((false, parse_decimal(price, USAGE_CLEAR)?));
            if iter.peek().map(|t| t.chars().all(char::is_alphabetic)) == Some(true) {
                iter.next();
            }
        } else if token.contains('/') || token.contains('_') {
            pair = Some(
                token
                    .parse::<Pair>()
                    .map_err(|_| CommandError::Validation(USAGE_CLEAR.to_string()))?,
            );
        } else {
            return Err(CommandError::Validation(format!(
                "Unexpected token '{token}'. {USAGE_CLEAR}"
            )));
        }
    }

    let target = target.ok_or_else(|| CommandError::Validation(USAGE_CLEAR.to_string()))?;
    Ok(Command::Clear {
        pair,
        target,
        side,
        price_filter,
        force,
    })
}

fn parse_fill(args: &[&str]) -> CommandResult<Command> {
    let mut pair = None;
    let mut side = None;
    let mut quote = None;
    let mut amount = None;
    let mut low = None;
    let mut high = None;
    let mut count = None;

    for token in args {
        let lower = token.to_ascii_lowercase();
        if let Ok(parsed_side) = lower.parse::<OrderSide>() {
            side = Some(parsed_side);
        } else if let Some(value) = lower.strip_prefix("quote=") {
            quote = Some(parse_decimal(value, USAGE_FILL)?);
        } else if let Some(value) = lower.strip_prefix("amount=") {
            amount = Some(parse_decimal(value, USAGE_FILL)?);
        } else if let Some(value) = lower.strip_prefix("low=") {
            low = Some(parse_decimal(value, USAGE_FILL)?);
        } else if let Some(value) = lower.strip_prefix("high=") {
            high = Some(parse_decimal(value, USAGE_FILL)?);
        } else if let Some(value) = lower.strip_prefix("count=") {
            count = Some(value.parse::<u32>().map_err(|_| {
                CommandError::Validation(USAGE_FILL.to_string())
            })?);
        } else if token.contains('/') || token.contains('_') {
            pair = Some(
                token
                    .parse::<Pair>()
                    .map_err(|_| CommandError::Validation(USAGE_FILL.to_string()))?,
            );
        } else {
            return Err(CommandError::Validation(format!(
                "Unexpected token '{token}'. {USAGE_FILL}"
            )));
        }
    }

    let side = side.ok_or_else(|| CommandError::Validation(USAGE_FILL.to_string()))?;
    let low = low.ok_or_else(|| CommandError::Validation(USAGE_FILL.to_string()))?;
    let high = high.ok_or_else(|| CommandError::Validation(USAGE_FILL.to_string()))?;
    let count = count.ok_or_else(|| CommandError::Validation(USAGE_FILL.to_string()))?;
    if quote.is_none() == amount.is_none() {
        return Err(CommandError::Validation(format!(
            "Exactly one of quote= or amount= is required. {USAGE_FILL}"
        )));
    }
    if low >= high || count == 0 {
        return Err(CommandError::Validation(USAGE_FILL.to_string()));
    }
    Ok(Command::Fill {
        pair,
        side,
        quote,
        amount,
        low,
        high,
        count,
    })
}

fn parse_place(side: OrderSide, args: &[&str]) -> CommandResult<Command> {
    let mut pair = None;
    let mut amount = None;
    let mut quote = None;
    let mut price = None;
    let mut market = false;

    for token in args {
        let lower = token.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("amount=") {
            amount = Some(parse_decimal(value, USAGE_BUY_SELL)?);
        } else if let Some(value) = lower.strip_prefix("quote=") {
            quote = Some(parse_decimal(value, USAGE_BUY_SELL)?);
        } else if let Some(value) = lower.strip_prefix("price=") {
            price = Some(parse_decimal(value, USAGE_BUY_SELL)?);
        } else if lower == "market" {
            market = true;
        } else if token.contains('/') || token.contains('_') {
            pair = Some(
                token
                    .parse::<Pair>()
                    .map_err(|_| CommandError::Validation(USAGE_BUY_SELL.to_string()))?,
            );
        } else {
            return Err(CommandError::Validation(format!(
                "Unexpected token '{token}'. {USAGE_BUY_SELL}"
            )));
        }
    }

    if amount.is_none() == quote.is_none() {
        return Err(CommandError::Validation(format!(
            "Exactly one of amount= or quote= is required. {USAGE_BUY_SELL}"
        )));
    }
    if market && price.is_some() {
        return Err(CommandError::Validation(USAGE_BUY_SELL.to_string()));
    }
    if !market && price.is_none() {
        return Err(CommandError::Validation(format!(
            "Either price= or market is required. {USAGE_BUY_SELL}"
        )));
    }
    Ok(Command::Place {
        side,
        pair,
        amount,
        quote,
        price,
    })
}

fn parse_make(args: &[&str]) -> CommandResult<Command> {
    if args.first().map(|t| t.to_ascii_lowercase()) != Some("price".to_string()) {
        return Err(CommandError::Validation(USAGE_MAKE.to_string()));
    }
    let price = parse_decimal(
        args.get(1)
            .ok_or_else(|| CommandError::Validation(USAGE_MAKE.to_string()))?,
        USAGE_MAKE,
    )?;
    // Optional coin label and a trailing `now` are accepted and ignored
    for token in &args[2..] {
        let lower = token.to_ascii_lowercase();
        if lower != "now" && !token.chars().all(char::is_alphabetic) {
            return Err(CommandError::Validation(USAGE_MAKE.to_string()));
        }
    }
    Ok(Command::Make { price })
}

fn parse_calc(args: &[&str]) -> CommandResult<Command> {
    if args.len() != 3 {
        return Err(CommandError::Validation(USAGE_CALC.to_string()));
    }
    Ok(Command::Calc {
        amount: parse_decimal(args[0], USAGE_CALC)?,
        from: args[1].to_uppercase(),
        to: args[2].to_uppercase(),
    })
}

fn parse_decimal(s: &str, usage: &str) -> CommandResult<Decimal> {
    s.parse()
        .map_err(|_| CommandError::Validation(format!("Bad number '{s}'. {usage}")))
}

fn parse_percent(s: &str, usage: &str) -> CommandResult<Decimal> {
    parse_decimal(s.trim_end_matches('%'), usage)
}

/// `min-max` pairs like `1-5` or `0.5-0.6`.
fn parse_range(s: &str, usage: &str) -> CommandResult<(Decimal, Decimal)> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| CommandError::Validation(usage.to_string()))?;
    let min = parse_decimal(min, usage)?;
    let max = parse_decimal(max, usage)?;
    if min > max {
        return Err(CommandError::Validation(format!(
            "Range is inverted. {usage}"
        )));
    }
    Ok((min, max))
}
