//! Static HTML dashboard comparing every agent.
//!
//! Output depends only on the arena state and the roster metadata, never on
//! the wall clock, so the same state always renders the same bytes.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::{AgentConfig, DashboardConfig};
use crate::models::{ArenaState, AssetClass, PortfolioLedger, TradeSide};

pub const DASHBOARD_FILE: &str = "arena_dashboard.html";

const CHART_WIDTH: f64 = 900.0;
const CHART_HEIGHT: f64 = 260.0;
const CHART_PAD: f64 = 36.0;

const STYLE: &str = r#"
:root { --bg: #0d1117; --card: #161b22; --hover: #1c2333; --border: #30363d; --text: #e6edf3; --sec: #8b949e; --muted: #484f58; --green: #3fb950; --red: #f85149; }
* { margin: 0; padding: 0; box-sizing: border-box; }
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; background: var(--bg); color: var(--text); line-height: 1.5; }
.page { max-width: 1440px; margin: 0 auto; padding: 20px; }
.header { text-align: center; padding: 24px; background: var(--card); border: 1px solid var(--border); border-radius: 12px; margin-bottom: 24px; }
.header h1 { font-size: 28px; letter-spacing: 2px; }
.header .meta { font-size: 12px; color: var(--sec); margin-top: 6px; }
.card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 18px 22px; margin-bottom: 24px; overflow-x: auto; }
.card h3 { font-size: 13px; color: var(--sec); text-transform: uppercase; letter-spacing: 1px; margin-bottom: 14px; }
table { width: 100%; border-collapse: collapse; font-size: 12px; }
th { text-align: left; padding: 6px 8px; border-bottom: 2px solid var(--border); color: var(--sec); font-size: 11px; text-transform: uppercase; white-space: nowrap; }
td { padding: 6px 8px; border-bottom: 1px solid rgba(48,54,61,0.5); font-variant-numeric: tabular-nums; }
tr:hover { background: var(--hover); }
.num { text-align: right; }
.positive { color: var(--green); } .negative { color: var(--red); }
.buy { color: var(--green); font-weight: 700; } .sell { color: var(--red); font-weight: 700; }
.symbol { font-weight: 700; color: #58a6ff; }
.asset { color: var(--sec); text-transform: uppercase; font-size: 11px; }
.none { color: var(--muted); text-align: center; }
.agents { display: grid; grid-template-columns: 1fr 1fr; gap: 16px; }
.agents .card { margin-bottom: 0; }
.desc { font-size: 12px; color: var(--sec); margin-bottom: 10px; }
.note { font-size: 11px; color: var(--sec); margin-top: 8px; }
.legend span { margin-right: 16px; font-size: 12px; }
.footer { text-align: center; padding: 20px; color: var(--muted); font-size: 12px; }
@media (max-width: 1000px) { .agents { grid-template-columns: 1fr; } }
"#;

/// Display metadata for one agent.
#[derive(Debug, Clone)]
struct AgentStyle {
    name: String,
    emoji: String,
    color: String,
    description: String,
    strategy: String,
}

/// Renders the arena dashboard.
pub struct DashboardRenderer {
    agents: BTreeMap<String, AgentStyle>,
    title: String,
    recent_trades: usize,
    refresh_secs: u32,
}

impl DashboardRenderer {
    pub fn new(agents: &[AgentConfig], config: &DashboardConfig) -> Self {
        let agents = agents
            .iter()
            .map(|a| {
                let style = AgentStyle {
                    name: a.name.clone(),
                    emoji: a.emoji.clone(),
                    color: a.color.clone(),
                    description: a.description.clone(),
                    strategy: a.strategy.kind.label().to_string(),
                };
                (a.id.clone(), style)
            })
            .collect();

        Self {
            agents,
            title: config.title.clone(),
            recent_trades: config.recent_trades,
            refresh_secs: config.refresh_secs,
        }
    }

    /// Render the full HTML document.
    pub fn render(&self, state: &ArenaState) -> Vec<u8> {
        let mut out = String::with_capacity(64 * 1024);
        // Writing into a String cannot fail
        let _ = self.write_document(&mut out, state);
        out.into_bytes()
    }

    fn style(&self, id: &str) -> AgentStyle {
        self.agents.get(id).cloned().unwrap_or_else(|| AgentStyle {
            name: id.to_string(),
            emoji: String::new(),
            color: "#8b949e".to_string(),
            description: String::new(),
            strategy: String::new(),
        })
    }

    fn label(&self, id: &str) -> String {
        let style = self.style(id);
        if style.emoji.is_empty() {
            escape(&style.name)
        } else {
            format!("{} {}", escape(&style.emoji), escape(&style.name))
        }
    }

    fn write_document(&self, out: &mut String, state: &ArenaState) -> fmt::Result {
        let last_run = state
            .last_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        writeln!(out, "<!DOCTYPE html>")?;
        writeln!(out, "<html lang=\"en\">\n<head>")?;
        writeln!(out, "<meta charset=\"UTF-8\">")?;
        writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">")?;
        writeln!(out, "<meta http-equiv=\"refresh\" content=\"{}\">", self.refresh_secs)?;
        writeln!(out, "<title>{}</title>", escape(&self.title))?;
        writeln!(out, "<style>{}</style>", STYLE)?;
        writeln!(out, "</head>\n<body>\n<div class=\"page\">")?;

        writeln!(out, "<div class=\"header\">")?;
        writeln!(out, "<h1>{}</h1>", escape(&self.title))?;
        writeln!(
            out,
            "<div class=\"meta\">Cycle {} &middot; Last run {} &middot; {} agents &middot; {} trades</div>",
            state.cycle,
            last_run,
            state.ledgers.len(),
            state.total_trades()
        )?;
        writeln!(out, "</div>")?;

        let ranked = state.standings();
        self.write_leaderboard(out, &ranked)?;
        self.write_equity_chart(out, &ranked)?;
        self.write_holdings(out, state)?;
        self.write_last_cycle(out, state)?;
        self.write_agent_cards(out, &ranked)?;

        writeln!(
            out,
            "<div class=\"footer\">Simulated trading with real market data. Not financial advice.</div>"
        )?;
        writeln!(out, "</div>\n</body>\n</html>")
    }

    fn write_leaderboard(&self, out: &mut String, ranked: &[&PortfolioLedger]) -> fmt::Result {
        writeln!(out, "<div class=\"card\"><h3>Leaderboard</h3>")?;
        writeln!(
            out,
            "<table><thead><tr><th>#</th><th>Agent</th><th>Strategy</th><th class=\"num\">Equity</th><th class=\"num\">P&amp;L</th><th class=\"num\">Return</th><th class=\"num\">Cash</th><th class=\"num\">Positions</th><th class=\"num\">Trades</th><th class=\"num\">Win rate</th></tr></thead><tbody>"
        )?;

        for (rank, ledger) in ranked.iter().enumerate() {
            let style = self.style(&ledger.agent_id);
            let pnl = ledger.total_pnl();
            writeln!(
                out,
                "<tr><td>{}</td><td style=\"color:{}\">{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num {}\">{}</td><td class=\"num {}\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{:.0}%</td></tr>",
                rank + 1,
                escape(&style.color),
                self.label(&ledger.agent_id),
                escape(&style.strategy),
                money(ledger.equity()),
                sign_class(pnl),
                signed_money(pnl),
                sign_class(pnl),
                signed_pct(ledger.return_pct()),
                money(ledger.cash),
                ledger.positions.len(),
                ledger.trades.len(),
                ledger.win_rate(),
            )?;
        }
        writeln!(out, "</tbody></table></div>")
    }

    fn write_equity_chart(&self, out: &mut String, ranked: &[&PortfolioLedger]) -> fmt::Result {
        writeln!(out, "<div class=\"card\"><h3>Equity Curves</h3>")?;

        let series: Vec<(&PortfolioLedger, Vec<(i64, f64)>)> = ranked
            .iter()
            .map(|l| {
                let points = l
                    .equity_curve
                    .iter()
                    .map(|p| (p.timestamp.timestamp(), p.equity.to_f64().unwrap_or(0.0)))
                    .collect();
                (*l, points)
            })
            .collect();

        let all: Vec<(i64, f64)> = series.iter().flat_map(|(_, p)| p.iter().copied()).collect();
        if all.len() < 2 {
            writeln!(out, "<div class=\"none\">No equity history yet</div></div>")?;
            return Ok(());
        }

        let baselines: Vec<f64> = ranked
            .iter()
            .map(|l| l.starting_cash.to_f64().unwrap_or(0.0))
            .collect();
        let t_min = all.iter().map(|p| p.0).min().unwrap_or(0);
        let t_max = all.iter().map(|p| p.0).max().unwrap_or(0);
        let v_min = all
            .iter()
            .map(|p| p.1)
            .chain(baselines.iter().copied())
            .fold(f64::INFINITY, f64::min);
        let v_max = all
            .iter()
            .map(|p| p.1)
            .chain(baselines.iter().copied())
            .fold(f64::NEG_INFINITY, f64::max);

        let x = |t: i64| -> f64 {
            if t_max == t_min {
                CHART_WIDTH / 2.0
            } else {
                CHART_PAD + (t - t_min) as f64 / (t_max - t_min) as f64 * (CHART_WIDTH - 2.0 * CHART_PAD)
            }
        };
        let y = |v: f64| -> f64 {
            if v_max <= v_min {
                CHART_HEIGHT / 2.0
            } else {
                CHART_HEIGHT - CHART_PAD - (v - v_min) / (v_max - v_min) * (CHART_HEIGHT - 2.0 * CHART_PAD)
            }
        };

        writeln!(
            out,
            "<svg viewBox=\"0 0 {w} {h}\" width=\"100%\" height=\"{h}\" role=\"img\" aria-label=\"Equity curves\">",
            w = CHART_WIDTH,
            h = CHART_HEIGHT
        )?;
        writeln!(
            out,
            "<text x=\"4\" y=\"{:.1}\" fill=\"#8b949e\" font-size=\"11\">{}</text>",
            CHART_PAD - 8.0,
            money(Decimal::try_from(v_max).unwrap_or_default())
        )?;
        writeln!(
            out,
            "<text x=\"4\" y=\"{:.1}\" fill=\"#8b949e\" font-size=\"11\">{}</text>",
            CHART_HEIGHT - CHART_PAD + 16.0,
            money(Decimal::try_from(v_min).unwrap_or_default())
        )?;

        if let Some(base) = baselines.first() {
            writeln!(
                out,
                "<line x1=\"{:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"#484f58\" stroke-dasharray=\"4 4\"/>",
                CHART_PAD,
                CHART_WIDTH - CHART_PAD,
                y = y(*base)
            )?;
        }

        for (ledger, points) in &series {
            if points.is_empty() {
                continue;
            }
            let color = escape(&self.style(&ledger.agent_id).color);
            let coords = points
                .iter()
                .map(|(t, v)| format!("{:.1},{:.1}", x(*t), y(*v)))
                .collect::<Vec<_>>()
                .join(" ");
            if points.len() == 1 {
                let (t, v) = points[0];
                writeln!(out, "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{}\"/>", x(t), y(v), color)?;
            } else {
                writeln!(
                    out,
                    "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"2\" points=\"{}\"/>",
                    color, coords
                )?;
            }
        }
        writeln!(out, "</svg>")?;

        write!(out, "<div class=\"legend\">")?;
        for ledger in ranked {
            let style = self.style(&ledger.agent_id);
            write!(
                out,
                "<span style=\"color:{}\">&#9632; {}</span>",
                escape(&style.color),
                self.label(&ledger.agent_id)
            )?;
        }
        writeln!(out, "</div></div>")
    }

    fn write_holdings(&self, out: &mut String, state: &ArenaState) -> fmt::Result {
        let symbols: BTreeMap<&str, AssetClass> = state
            .ledgers
            .values()
            .flat_map(|l| l.positions.values().map(|p| (p.symbol.as_str(), p.asset_class)))
            .collect();

        writeln!(out, "<div class=\"card\"><h3>Holdings: Who Holds What</h3>")?;
        if symbols.is_empty() {
            return writeln!(out, "<div class=\"none\">No open positions</div></div>");
        }

        write!(out, "<table><thead><tr><th>Symbol</th><th>Type</th>")?;
        for id in state.ledgers.keys() {
            let style = self.style(id);
            write!(out, "<th class=\"num\" style=\"color:{}\">{}</th>", escape(&style.color), self.label(id))?;
        }
        writeln!(out, "</tr></thead><tbody>")?;

        for (symbol, class) in symbols {
            write!(
                out,
                "<tr><td class=\"symbol\">{}</td><td class=\"asset\">{}</td>",
                escape(symbol),
                class.as_str()
            )?;
            for ledger in state.ledgers.values() {
                match ledger.positions.get(symbol) {
                    Some(p) => write!(
                        out,
                        "<td class=\"num {}\" title=\"{} @ {} ({})\">{}</td>",
                        sign_class(p.unrealized_pnl()),
                        p.quantity.normalize(),
                        money(p.avg_cost),
                        signed_pct(p.unrealized_return() * dec!(100)),
                        money(p.market_value())
                    )?,
                    None => write!(out, "<td class=\"none\">&mdash;</td>")?,
                }
            }
            writeln!(out, "</tr>")?;
        }
        writeln!(out, "</tbody></table></div>")
    }

    fn write_last_cycle(&self, out: &mut String, state: &ArenaState) -> fmt::Result {
        let Some(summary) = &state.last_cycle else {
            return Ok(());
        };

        writeln!(out, "<div class=\"card\"><h3>Cycle {}</h3>", summary.cycle)?;
        writeln!(
            out,
            "<div class=\"desc\">{} quotes received{}</div>",
            summary.quotes_received,
            if summary.signal_only { " &middot; signal-only run, no trades applied" } else { "" }
        )?;

        writeln!(
            out,
            "<table><thead><tr><th>Agent</th><th class=\"num\">Executed</th><th>Rejected</th><th>Not applied</th></tr></thead><tbody>"
        )?;
        for (id, agent) in &summary.agents {
            let rejected = agent
                .rejected
                .iter()
                .map(|r| {
                    format!(
                        "{} {} {}: {}",
                        r.action.side.as_str(),
                        r.action.quantity.normalize(),
                        r.action.symbol,
                        r.rejection
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            let unapplied = agent
                .unapplied
                .iter()
                .map(|a| format!("{} {} {}", a.side.as_str(), a.quantity.normalize(), a.symbol))
                .collect::<Vec<_>>()
                .join("; ");
            writeln!(
                out,
                "<tr><td>{}</td><td class=\"num\">{}</td><td>{}</td><td>{}</td></tr>",
                self.label(id),
                agent.executed,
                or_dash(&escape(&rejected)),
                or_dash(&escape(&unapplied))
            )?;
        }
        writeln!(out, "</tbody></table>")?;

        if !summary.data_failures.is_empty() {
            writeln!(
                out,
                "<div class=\"note\">Unavailable quotes: {}</div>",
                escape(&summary.data_failures.join(", "))
            )?;
        }
        writeln!(out, "</div>")
    }

    fn write_agent_cards(&self, out: &mut String, ranked: &[&PortfolioLedger]) -> fmt::Result {
        writeln!(out, "<div class=\"agents\">")?;
        for ledger in ranked {
            let style = self.style(&ledger.agent_id);
            writeln!(out, "<div class=\"card\">")?;
            writeln!(out, "<h3 style=\"color:{}\">{}</h3>", escape(&style.color), self.label(&ledger.agent_id))?;
            if !style.description.is_empty() {
                writeln!(out, "<div class=\"desc\">{}</div>", escape(&style.description))?;
            }
            writeln!(
                out,
                "<div class=\"desc\">Realized {} &middot; Unrealized {} &middot; Started with {}</div>",
                signed_money(ledger.realized_pnl()),
                signed_money(ledger.unrealized_pnl()),
                money(ledger.starting_cash)
            )?;

            if ledger.trades.is_empty() {
                writeln!(out, "<div class=\"none\">No trades yet</div>")?;
            } else {
                writeln!(
                    out,
                    "<table><thead><tr><th>Time</th><th>Side</th><th>Symbol</th><th class=\"num\">Qty</th><th class=\"num\">Price</th><th class=\"num\">P&amp;L</th><th>Reason</th></tr></thead><tbody>"
                )?;
                for trade in ledger.recent_trades(self.recent_trades) {
                    let side = match trade.side {
                        TradeSide::Buy => "buy",
                        TradeSide::Sell => "sell",
                    };
                    let pnl = match trade.realized_pnl {
                        Some(pnl) => format!("<span class=\"{}\">{}</span>", sign_class(pnl), signed_money(pnl)),
                        None => "&mdash;".to_string(),
                    };
                    writeln!(
                        out,
                        "<tr><td>{}</td><td class=\"{}\">{}</td><td class=\"symbol\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td>{}</td></tr>",
                        trade.timestamp.format("%Y-%m-%d %H:%M"),
                        side,
                        trade.side.as_str(),
                        escape(&trade.symbol),
                        trade.quantity.normalize(),
                        money(trade.price),
                        pnl,
                        escape(&truncate(&trade.reason, 80))
                    )?;
                }
                writeln!(out, "</tbody></table>")?;
            }
            writeln!(out, "</div>")?;
        }
        writeln!(out, "</div>")
    }
}

/// Escape text for HTML element and attribute content.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "&mdash;"
    } else {
        s
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn sign_class(d: Decimal) -> &'static str {
    if d < Decimal::ZERO {
        "negative"
    } else {
        "positive"
    }
}

/// `$1,234.56`
pub fn money(d: Decimal) -> String {
    let rounded = d.abs().round_dp(2);
    let whole = rounded.trunc();
    let cents = ((rounded - whole) * dec!(100)).round().to_u32().unwrap_or(0);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if d < Decimal::ZERO && !rounded.is_zero() { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents)
}

fn signed_money(d: Decimal) -> String {
    if d < Decimal::ZERO {
        money(d)
    } else {
        format!("+{}", money(d))
    }
}

fn signed_pct(d: Decimal) -> String {
    let rounded = d.round_dp(2);
    if rounded < Decimal::ZERO {
        format!("{:.2}%", rounded)
    } else {
        format!("+{:.2}%", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use crate::models::{AgentCycleSummary, CycleSummary, Quote, RejectedAction, Rejection, TradeAction};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn renderer() -> DashboardRenderer {
        let config = ArenaConfig::default();
        DashboardRenderer::new(&config.agents, &config.dashboard)
    }

    fn busy_state() -> ArenaState {
        let config = ArenaConfig::default();
        let mut state = ArenaState::new(config.roster(), dec!(10000), at(13)).next_cycle(at(15));

        let pete = state.ledgers.get_mut("momentum_pete").unwrap();
        pete.record_equity(0, at(13));
        pete.apply(
            &TradeAction::buy("NVDA", dec!(10)).with_reason("MACD <bullish> & rising"),
            &Quote::spot("NVDA", dec!(120), at(14)),
        )
        .unwrap();
        let mut quotes = crate::models::QuoteBook::new();
        quotes.insert("NVDA".to_string(), Quote::spot("NVDA", dec!(150), at(15)));
        pete.mark(&quotes);
        pete.record_equity(1, at(15));

        let mut agents = BTreeMap::new();
        agents.insert(
            "yolo_yolanda".to_string(),
            AgentCycleSummary {
                executed: 0,
                unapplied: vec![],
                rejected: vec![RejectedAction {
                    action: TradeAction::buy("TSLA", dec!(1000)),
                    rejection: Rejection::InsufficientCash {
                        needed: dec!(250000),
                        available: dec!(10000),
                    },
                }],
            },
        );
        state.last_cycle = Some(CycleSummary {
            cycle: 1,
            ran_at: at(15),
            signal_only: false,
            quotes_received: 19,
            data_failures: vec!["DOGE-USD: unknown symbol after 1 attempt(s)".to_string()],
            agents,
        });
        state
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = renderer();
        let state = busy_state();

        assert_eq!(renderer.render(&state), renderer.render(&state.clone()));
    }

    #[test]
    fn test_render_contents() {
        let html = String::from_utf8(renderer().render(&busy_state())).unwrap();

        assert!(html.contains("Cycle 1 &middot; Last run 2026-03-02 15:00 UTC"));
        assert!(html.contains("<meta http-equiv=\"refresh\" content=\"120\">"));
        assert!(html.contains("Momentum Pete"));
        assert!(html.contains("$10,300.00")); // 8800 cash + 10 * 150
        assert!(html.contains("+3.00%"));
        assert!(html.contains("<polyline"));
        assert!(html.contains("MACD &lt;bullish&gt; &amp; rising"));
        assert!(html.contains("insufficient cash"));
        assert!(html.contains("DOGE-USD"));
        assert!(html.contains("<td class=\"symbol\">NVDA</td><td class=\"asset\">stock</td>"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_leader_listed_first() {
        let html = String::from_utf8(renderer().render(&busy_state())).unwrap();
        let pete = html.find("Momentum Pete").unwrap();
        let carl = html.find("Cautious Carl").unwrap();
        assert!(pete < carl);
    }

    #[test]
    fn test_fresh_state_renders() {
        let config = ArenaConfig::default();
        let state = ArenaState::new(config.roster(), dec!(10000), at(13));
        let html = String::from_utf8(renderer().render(&state)).unwrap();

        assert!(html.contains("Last run never"));
        assert!(html.contains("No equity history yet"));
        assert!(html.contains("No open positions"));
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(dec!(10000)), "$10,000.00");
        assert_eq!(money(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(money(dec!(-42.5)), "-$42.50");
        assert_eq!(money(dec!(0.004)), "$0.00");
        assert_eq!(signed_money(dec!(12)), "+$12.00");
        assert_eq!(signed_pct(dec!(-1.234)), "-1.23%");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
