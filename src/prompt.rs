//! Prompt construction for the daily fortune reading
//!
//! The gateway treats this module's output as an opaque string pair; the
//! template structure matters only to the frontend renderer and to the
//! desk-decor extraction endpoint, which parses the `fortune-tip` and
//! `desk-decor` markers out of the generated reply.

use crate::db::{Gender, UserProfile};
use chrono::Local;
use rand::seq::SliceRandom;

pub const SYSTEM_PROMPT: &str = "You are an insightful fortune teller.";

/// Desk ornaments the reading may recommend; three are offered per request.
const ORNAMENTS: &[&str] = &[
    "水晶洞",
    "金蟾",
    "貔貅",
    "文昌塔",
    "关公像",
    "龙龟",
    "葫芦",
    "福禄寿三星",
    "五帝钱",
    "大象",
];

/// Build the daily reading prompt for a registered user.
pub fn daily_prompt(profile: &UserProfile) -> String {
    let mut rng = rand::thread_rng();
    let mut pool: Vec<&str> = ORNAMENTS.to_vec();
    pool.shuffle(&mut rng);
    let ornaments = pool[..3].join(",");

    let today = Local::now().format("%Y-%m-%d");
    let gender = match profile.gender {
        Gender::Male => "男性",
        Gender::Female => "女性",
    };

    format!(
        r#"我是{username}，出生信息如下：
- 出生日期：{birth_date} (阳历)
- 出生时间：{birth_time}
- 性别：{gender}

今天的日期是：{today}

目前可用的摆件列表: {ornaments}

请给我一个100字左右的谶语小诗，小诗对仗工整；解谶语时语气像街头算命的道长，不要完全说破，给用户留有想象空间。

请根据我的八字流年，推算出今天的运势，分析事业与工作、财运、感情与人际、健康、幸运色和摆件。

最后总结12到20条tips用于轮播提示，尽可能涵盖已输出内容的重点信息。

请按照以下格式输出：

## 📜今天给{username}的谶语

<div class="fortune-story">
  <div class="fortune-story-item">{{谶语小诗语句}}</div>
</div>

## 🍀八字与流年分析 {username}今日{today}具体运势分析：
- 事业与工作：
- 财运：
- 感情与人际：
- 健康：

## 🍭幸运色分析

<div class="lucky-color" style="color: {{颜色值}}">{{颜色描述信息}}</div>

## 🪆基于以上分析, 今天适合在桌面摆放的一个摆件为{{摆件名}}:
 <img class="desk-decor" src="/api/random-desk-decor?keyword={{摆件名}}" />

## 💡解谶语小故事

<div class="fortune-story-explanation">{{谶语小故事解释}}</div>

## 🎯总结今日tips信息:

<div class="fortune-tip">{{tip信息}}</div>
"#,
        username = profile.username,
        birth_date = profile.birth_date,
        birth_time = profile.birth_time,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> UserProfile {
        UserProfile {
            uid: "u1".to_string(),
            username: "小明".to_string(),
            gender: Gender::Female,
            birth_date: "1995-08-12".to_string(),
            birth_time: "07:30".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_carries_profile_fields() {
        let prompt = daily_prompt(&profile());
        assert!(prompt.contains("小明"));
        assert!(prompt.contains("1995-08-12"));
        assert!(prompt.contains("07:30"));
        assert!(prompt.contains("女性"));
    }

    #[test]
    fn test_prompt_offers_three_ornaments() {
        let prompt = daily_prompt(&profile());
        let line = prompt
            .lines()
            .find(|l| l.starts_with("目前可用的摆件列表"))
            .unwrap();
        let offered: Vec<&str> = line.split(": ").nth(1).unwrap().split(',').collect();
        assert_eq!(offered.len(), 3);
        for ornament in &offered {
            assert!(ORNAMENTS.contains(ornament));
        }
    }

    #[test]
    fn test_prompt_keeps_extraction_markers() {
        let prompt = daily_prompt(&profile());
        assert!(prompt.contains(r#"<div class="fortune-tip">"#));
        assert!(prompt.contains(r#"<img class="desk-decor""#));
    }
}
