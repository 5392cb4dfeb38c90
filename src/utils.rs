 pub fn now_ts() -> f64 {
     let now = std::time::SystemTime::now()
         .duration_since(std::time::UNIX_EPOCH)
         .unwrap_or_default();
     now.as_secs_f64()
 }
 
 /// Coin ids are lowercase slugs; user input is trimmed and lowercased.
 /// Returns `None` for blank input.
 pub fn normalize_coin_id(raw: &str) -> Option<String> {
     let id = raw.trim().to_lowercase();
     if id.is_empty() {
         None
     } else {
         Some(id)
     }
 }
 
 #[cfg(test)]
 mod tests {
     use super::*;
 
     #[test]
     fn test_normalize_coin_id() {
         assert_eq!(normalize_coin_id("  Bitcoin ").as_deref(), Some("bitcoin"));
         assert_eq!(normalize_coin_id("usd-coin").as_deref(), Some("usd-coin"));
         assert_eq!(normalize_coin_id("   "), None);
     }
 
     #[test]
     fn test_now_ts_is_recent() {
         // 2020-01-01
         assert!(now_ts() > 1_577_836_800.0);
     }
 }
