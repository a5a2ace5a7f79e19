use std::collections::{BTreeMap, HashMap};

use groupfund_core::{
    FundResult, Member, MemberStatus, Obligation, ObligationFilter, ObligationStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::Ledger;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub total: usize,
    pub unpaid: usize,
    pub overdue: usize,
    pub paid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekBreakdown {
    pub week: i32,
    pub total: usize,
    pub paid: usize,
    pub collected: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberBreakdown {
    pub member_id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: MemberStatus,
    pub paid_count: usize,
    pub total_count: usize,
    /// Whole percent, rounded half up.
    pub completion_rate: u32,
    pub total_paid: Decimal,
    pub total_unpaid: Decimal,
    pub total_penalty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundSummary {
    pub members: usize,
    pub active_members: usize,
    pub obligations: StatusBreakdown,
    pub total_amount: Decimal,
    pub total_paid: Decimal,
    pub total_unpaid: Decimal,
    pub total_penalty: Decimal,
    pub weeks: Vec<WeekBreakdown>,
    pub by_member: Vec<MemberBreakdown>,
}

impl FundSummary {
    pub fn build(members: &[Member], obligations: &[Obligation]) -> Self {
        let mut counts = StatusBreakdown {
            total: obligations.len(),
            ..StatusBreakdown::default()
        };
        let mut total_amount = Decimal::ZERO;
        let mut total_paid = Decimal::ZERO;
        let mut total_penalty = Decimal::ZERO;
        let mut weeks: BTreeMap<i32, WeekBreakdown> = BTreeMap::new();
        let mut per_member: HashMap<Uuid, Vec<&Obligation>> = HashMap::new();

        for obligation in obligations {
            total_amount += obligation.amount;
            total_penalty += obligation.penalty;

            let week = weeks.entry(obligation.week).or_insert_with(|| WeekBreakdown {
                week: obligation.week,
                total: 0,
                paid: 0,
                collected: Decimal::ZERO,
                outstanding: Decimal::ZERO,
            });
            week.total += 1;

            match obligation.status {
                ObligationStatus::Paid => {
                    counts.paid += 1;
                    total_paid += obligation.amount;
                    week.paid += 1;
                    week.collected += obligation.amount;
                }
                ObligationStatus::Unpaid => {
                    counts.unpaid += 1;
                    week.outstanding += obligation.amount;
                }
                ObligationStatus::Overdue => {
                    counts.overdue += 1;
                    week.outstanding += obligation.amount;
                }
            }

            per_member
                .entry(obligation.member_id)
                .or_default()
                .push(obligation);
        }

        let by_member = members
            .iter()
            .map(|member| {
                let owned = per_member.get(&member.id).map(Vec::as_slice).unwrap_or(&[]);
                member_breakdown(member, owned)
            })
            .collect();

        Self {
            members: members.len(),
            active_members: members
                .iter()
                .filter(|member| member.status == MemberStatus::Active)
                .count(),
            obligations: counts,
            total_amount,
            total_paid,
            total_unpaid: total_amount - total_paid,
            total_penalty,
            // Newest week first.
            weeks: weeks.into_values().rev().collect(),
            by_member,
        }
    }
}

fn member_breakdown(member: &Member, obligations: &[&Obligation]) -> MemberBreakdown {
    let mut paid_count = 0;
    let mut total_paid = Decimal::ZERO;
    let mut total_unpaid = Decimal::ZERO;
    let mut total_penalty = Decimal::ZERO;

    for obligation in obligations {
        total_penalty += obligation.penalty;
        if obligation.status == ObligationStatus::Paid {
            paid_count += 1;
            total_paid += obligation.amount;
        } else {
            total_unpaid += obligation.amount;
        }
    }

    MemberBreakdown {
        member_id: member.id,
        name: member.name.clone(),
        phone: member.phone.clone(),
        status: member.status,
        paid_count,
        total_count: obligations.len(),
        completion_rate: completion_rate(paid_count, obligations.len()),
        total_paid,
        total_unpaid,
        total_penalty,
    }
}

fn completion_rate(paid: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((paid * 200 + total) / (2 * total)) as u32
}

fn status_label(status: ObligationStatus) -> &'static str {
    match status {
        ObligationStatus::Paid => "Đã đóng",
        ObligationStatus::Unpaid => "Chưa đóng",
        ObligationStatus::Overdue => "Quá hạn",
    }
}

fn member_label(status: MemberStatus) -> &'static str {
    match status {
        MemberStatus::Active => "Hoạt động",
        MemberStatus::Inactive => "Không hoạt động",
    }
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<I, S>(cells: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells
        .into_iter()
        .map(|cell| csv_cell(cell.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Detail rows, then the fund totals, then one line per member.
pub fn render_csv(members: &[Member], obligations: &[Obligation]) -> String {
    let by_id: HashMap<Uuid, &Member> = members.iter().map(|member| (member.id, member)).collect();
    let summary = FundSummary::build(members, obligations);
    let mut lines = Vec::with_capacity(obligations.len() + members.len() + 14);

    lines.push(csv_row([
        "Tên thành viên",
        "Số điện thoại",
        "Trạng thái",
        "Tuần",
        "Số tiền",
        "Trạng thái đóng góp",
        "Tiền phạt",
        "Hạn nộp",
        "Ngày nộp",
        "Ngày tạo",
    ]));

    let mut ordered: Vec<&Obligation> = obligations.iter().collect();
    ordered.sort_by(|a, b| b.week.cmp(&a.week).then(b.created_at.cmp(&a.created_at)));
    for obligation in ordered {
        let member = by_id.get(&obligation.member_id);
        lines.push(csv_row([
            member.map_or("N/A".to_string(), |member| member.name.clone()),
            member.map_or("N/A".to_string(), |member| member.phone.clone()),
            member.map_or("N/A".to_string(), |member| member.status.as_str().to_string()),
            obligation.week.to_string(),
            obligation.amount.to_string(),
            status_label(obligation.status).to_string(),
            obligation.penalty.to_string(),
            obligation.due_date.to_string(),
            obligation
                .paid_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
            obligation.created_at.to_rfc3339(),
        ]));
    }

    lines.push(String::new());
    lines.push(csv_row(["=== TỔNG KẾT ==="]));
    lines.push(csv_row(["Tổng thành viên".to_string(), summary.members.to_string()]));
    lines.push(csv_row([
        "Thành viên hoạt động".to_string(),
        summary.active_members.to_string(),
    ]));
    lines.push(csv_row([
        "Tổng đóng góp".to_string(),
        summary.obligations.total.to_string(),
    ]));
    lines.push(csv_row(["Đã đóng".to_string(), summary.obligations.paid.to_string()]));
    lines.push(csv_row([
        "Chưa đóng".to_string(),
        summary.obligations.unpaid.to_string(),
    ]));
    lines.push(csv_row([
        "Quá hạn".to_string(),
        summary.obligations.overdue.to_string(),
    ]));
    lines.push(csv_row(["Tổng tiền".to_string(), summary.total_amount.to_string()]));
    lines.push(csv_row(["Tổng phạt".to_string(), summary.total_penalty.to_string()]));
    lines.push(String::new());
    lines.push(csv_row(["=== CHI TIẾT THEO THÀNH VIÊN ==="]));

    for row in &summary.by_member {
        lines.push(csv_row([
            row.name.clone(),
            row.phone.clone(),
            member_label(row.status).to_string(),
            format!("{}/{}", row.paid_count, row.total_count),
            format!("{}%", row.completion_rate),
            row.total_paid.to_string(),
            row.total_unpaid.to_string(),
            row.total_penalty.to_string(),
        ]));
    }

    lines.join("\n")
}

impl Ledger {
    pub async fn summary(&self) -> FundResult<FundSummary> {
        let members = self.store.list_members(None).await?;
        let obligations = self
            .store
            .list_obligations(&ObligationFilter::default())
            .await?;
        Ok(FundSummary::build(&members, &obligations))
    }

    pub async fn export_csv(&self) -> FundResult<String> {
        let members = self.store.list_members(None).await?;
        let obligations = self
            .store
            .list_obligations(&ObligationFilter::default())
            .await?;
        Ok(render_csv(&members, &obligations))
    }
}
