use std::cmp::Ordering;

/// 隐藏字符串的中间字符
/// 当 count >= 长度时，整串替换为等长的星号
pub fn hide_secret(secret: &str, count: usize) -> String {
    let length = secret.chars().count();
    if length == 0 {
        return String::new();
    }
    if length <= count {
        return "*".repeat(length);
    }

    // 剩余可见字符：前缀取向上取整的一半，后缀取向下取整的一半
    let visible = length - count;
    let prefix = visible.div_ceil(2);
    let suffix = visible / 2;

    let head: String = secret.chars().take(prefix).collect();
    let tail: String = secret.chars().skip(length - suffix).collect();
    format!("{}{}{}", head, "*".repeat(count), tail)
}

/// 版本号对比
/// 去掉前导"v"后按"."分割，从左到右逐段按数值比较；
/// 前缀相同时，段数多的版本号更大
pub fn compare_version(version1: &str, version2: &str) -> Ordering {
    let v1: Vec<u64> = split_version(version1);
    let v2: Vec<u64> = split_version(version2);

    for (a, b) in v1.iter().zip(v2.iter()) {
        match a.cmp(b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    v1.len().cmp(&v2.len())
}

fn split_version(version: &str) -> Vec<u64> {
    version
        .to_lowercase()
        .trim_start_matches('v')
        .split('.')
        // 非数字段按0处理
        .map(|s| s.parse::<u64>().unwrap_or(0))
        .collect()
}
