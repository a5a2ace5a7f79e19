//! Member-facing message texts.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Local display offset (UTC+7).
const DISPLAY_OFFSET_SECS: i32 = 7 * 3600;

/// Formats a whole-unit amount as `50.000 VNĐ`.
pub fn format_vnd(amount: Decimal) -> String {
    let rounded = amount.round();
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{grouped} VNĐ")
    } else {
        format!("{grouped} VNĐ")
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(DISPLAY_OFFSET_SECS) {
        Some(offset) => at.with_timezone(&offset).format("%H:%M %d/%m/%Y").to_string(),
        None => at.format("%H:%M %d/%m/%Y UTC").to_string(),
    }
}

pub fn reminder(name: &str, week: i32, amount: Decimal, due_date: NaiveDate) -> String {
    format!(
        "Nhắc nhở đóng quỹ\n\nXin chào {name}!\n\nTuần {week} đã đến hạn đóng quỹ:\nSố tiền: {}\nHạn nộp: {}\n\nVui lòng đóng tiền đúng hạn để tránh bị phạt.\n\nCảm ơn bạn!",
        format_vnd(amount),
        format_date(due_date),
    )
}

pub fn overdue(
    name: &str,
    week: i32,
    amount: Decimal,
    penalty: Decimal,
    due_date: NaiveDate,
) -> String {
    format!(
        "Cảnh báo quá hạn\n\nXin chào {name}!\n\nBạn đã quá hạn đóng quỹ tuần {week}:\nSố tiền gốc: {}\nTiền phạt: {}\nHạn nộp: {}\n\nTổng cộng cần đóng: {}\n\nVui lòng đóng tiền ngay để tránh phạt thêm.\n\nCảm ơn bạn!",
        format_vnd(amount),
        format_vnd(penalty),
        format_date(due_date),
        format_vnd(amount + penalty),
    )
}

pub fn payment_confirmed(
    name: &str,
    week: i32,
    amount: Decimal,
    paid_at: DateTime<Utc>,
    note: Option<&str>,
) -> String {
    let mut text = format!(
        "Xác nhận đóng quỹ\n\nXin chào {name}!\n\nBạn đã đóng quỹ tuần {week} thành công:\nSố tiền: {}\nThời gian: {}",
        format_vnd(amount),
        format_timestamp(paid_at),
    );
    if let Some(note) = note.filter(|note| !note.trim().is_empty()) {
        text.push_str(&format!("\nGhi chú: {}", note.trim()));
    }
    text.push_str("\n\nCảm ơn bạn!");
    text
}

pub fn auto_payment_confirmed(
    name: &str,
    week: i32,
    amount: Decimal,
    paid_at: DateTime<Utc>,
    provider_trans_id: &str,
) -> String {
    format!(
        "Xác nhận đóng quỹ tự động\n\nXin chào {name}!\n\nHệ thống đã ghi nhận khoản đóng quỹ tuần {week}:\nSố tiền: {}\nMã giao dịch: {provider_trans_id}\nThời gian: {}\n\nCảm ơn bạn!",
        format_vnd(amount),
        format_timestamp(paid_at),
    )
}

pub fn weekly_broadcast(week: i32) -> String {
    format!(
        "Nhắc nhở đóng quỹ tuần {week}\n\nXin chào tất cả thành viên!\n\nTuần {week} đã đến hạn đóng quỹ.\nVui lòng đóng tiền đúng hạn để tránh bị phạt.\n\nCảm ơn các bạn!"
    )
}

pub fn monthly_broadcast(now: DateTime<Utc>) -> String {
    let month = now.format("%m/%Y");
    format!(
        "Báo cáo tháng {month}\n\nXin chào tất cả thành viên!\n\nBáo cáo tình hình đóng quỹ tháng {month} đã được cập nhật.\nVui lòng kiểm tra dashboard để xem chi tiết.\n\nCảm ơn các bạn!"
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn groups_thousands_with_dots() {
        assert_eq!(format_vnd(Decimal::new(50_000, 0)), "50.000 VNĐ");
        assert_eq!(format_vnd(Decimal::new(1_234_567, 0)), "1.234.567 VNĐ");
        assert_eq!(format_vnd(Decimal::new(999, 0)), "999 VNĐ");
        assert_eq!(format_vnd(Decimal::ZERO), "0 VNĐ");
        assert_eq!(format_vnd(Decimal::new(-5_000, 0)), "-5.000 VNĐ");
    }

    #[test]
    fn overdue_states_total() {
        let text = overdue(
            "Lan",
            5,
            Decimal::new(50_000, 0),
            Decimal::new(10_000, 0),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        assert!(text.contains("tuần 5"));
        assert!(text.contains("Tiền phạt: 10.000 VNĐ"));
        assert!(text.contains("Tổng cộng cần đóng: 60.000 VNĐ"));
        assert!(text.contains("07/01/2024"));
    }

    #[test]
    fn confirmation_shows_local_time_and_note() {
        let paid_at = Utc.with_ymd_and_hms(2024, 1, 20, 3, 30, 0).unwrap();
        let text = payment_confirmed("Lan", 5, Decimal::new(50_000, 0), paid_at, Some("cash"));
        assert!(text.contains("10:30 20/01/2024"));
        assert!(text.contains("Ghi chú: cash"));

        let bare = payment_confirmed("Lan", 5, Decimal::new(50_000, 0), paid_at, Some("  "));
        assert!(!bare.contains("Ghi chú"));
    }
}
