//! 主题模式匹配
//!
//! 主题名以`.`分段，订阅模式遵循AMQP topic语义：`*`匹配恰好一段，
//! `#`匹配零段或多段。内存总线与测试直接使用本实现，RabbitMQ总线
//! 由broker完成同语义的路由。

/// 判断事件主题是否匹配订阅模式
pub fn matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    matches_segments(&pattern, &topic)
}

fn matches_segments(pattern: &[&str], topic: &[&str]) -> bool {
    match (pattern.first(), topic.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            // `#`可吞掉任意数量的剩余段
            matches_segments(&pattern[1..], topic)
                || (!topic.is_empty() && matches_segments(pattern, &topic[1..]))
        }
        (Some(&"*"), Some(_)) => matches_segments(&pattern[1..], &topic[1..]),
        (Some(p), Some(t)) if p == t => matches_segments(&pattern[1..], &topic[1..]),
        _ => false,
    }
}
