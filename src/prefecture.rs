/// The 47 prefectures in the MHLW/spreadsheet order: (Japanese name, English name, patient id prefix).
pub const PREFECTURES: [(&str, &str, &str); 47] = [
    ("北海道", "Hokkaido", "HKD"),
    ("青森県", "Aomori", "AM"),
    ("岩手県", "Iwate", "IW"),
    ("宮城県", "Miyagi", "MYG"),
    ("秋田県", "Akita", "AK"),
    ("山形県", "Yamagata", "YGT"),
    ("福島県", "Fukushima", "FKS"),
    ("茨城県", "Ibaraki", "IB"),
    ("栃木県", "Tochigi", "TCG"),
    ("群馬県", "Gunma", "GM"),
    ("埼玉県", "Saitama", "STM"),
    ("千葉県", "Chiba", "CHB"),
    ("東京都", "Tokyo", "TOK"),
    ("神奈川県", "Kanagawa", "KNG"),
    ("新潟県", "Niigata", "NGT"),
    ("富山県", "Toyama", "TY"),
    ("石川県", "Ishikawa", "ISK"),
    ("福井県", "Fukui", "FKI"),
    ("山梨県", "Yamanashi", "YNS"),
    ("長野県", "Nagano", "NGN"),
    ("岐阜県", "Gifu", "GF"),
    ("静岡県", "Shizuoka", "SZ"),
    ("愛知県", "Aichi", "AC"),
    ("三重県", "Mie", "ME"),
    ("滋賀県", "Shiga", "SHG"),
    ("京都府", "Kyoto", "KYT"),
    ("大阪府", "Osaka", "OSK"),
    ("兵庫県", "Hyogo", "HY"),
    ("奈良県", "Nara", "NR"),
    ("和歌山県", "Wakayama", "WKY"),
    ("鳥取県", "Tottori", "TTR"),
    ("島根県", "Shimane", "SM"),
    ("岡山県", "Okayama", "OKY"),
    ("広島県", "Hiroshima", "HRS"),
    ("山口県", "Yamaguchi", "YGC"),
    ("徳島県", "Tokushima", "TKS"),
    ("香川県", "Kagawa", "KGW"),
    ("愛媛県", "Ehime", "EH"),
    ("高知県", "Kochi", "KC"),
    ("福岡県", "Fukuoka", "FK"),
    ("佐賀県", "Saga", "SG"),
    ("長崎県", "Nagasaki", "NGS"),
    ("熊本県", "Kumamoto", "KM"),
    ("大分県", "Oita", "OIT"),
    ("宮崎県", "Miyazaki", "MYZ"),
    ("鹿児島県", "Kagoshima", "KGS"),
    ("沖縄県", "Okinawa", "OKN"),
];

pub const PORT_QUARANTINE: &str = "Port Quarantine";
const PORT_QUARANTINE_PREFIX: &str = "PRT";

/// Patient id prefix for an English prefecture name (or "Port Quarantine").
pub fn id_prefix(prefecture: &str) -> Option<&'static str> {
    if prefecture == PORT_QUARANTINE {
        return Some(PORT_QUARANTINE_PREFIX);
    }
    PREFECTURES
        .iter()
        .find(|(_, en, _)| *en == prefecture)
        .map(|(_, _, prefix)| *prefix)
}

/// True for a Japanese prefecture name, with or without its single 都/道/府/県 suffix.
pub fn is_japanese_name(name: &str) -> bool {
    PREFECTURES
        .iter()
        .any(|(ja, _, _)| *ja == name || ja.strip_suffix(['都', '道', '府', '県']) == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(id_prefix("Tokyo"), Some("TOK"));
        assert_eq!(id_prefix("Hokkaido"), Some("HKD"));
        assert_eq!(id_prefix("Port Quarantine"), Some("PRT"));
        assert_eq!(id_prefix("Atlantis"), None);
    }

    #[test]
    fn japanese_names() {
        assert!(is_japanese_name("北海道"));
        assert!(is_japanese_name("東京都"));
        assert!(is_japanese_name("東京"));
        assert!(is_japanese_name("神奈川"));
        assert!(is_japanese_name("京都"));
        assert!(is_japanese_name("京都府"));
        assert!(is_japanese_name("大阪"));
        assert!(!is_japanese_name("京"));
        assert!(!is_japanese_name("その他"));
        assert!(!is_japanese_name("合計"));
    }
}
