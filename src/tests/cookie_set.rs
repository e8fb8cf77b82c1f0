use crate::{Cookie, CookieSet};

#[test]
pub fn test_iteration_cookies() -> std::io::Result<()> {
    let mut cookies = CookieSet::new();

    for code in 1..59 {
        assert!(cookies.insert(Cookie(code)));
    }

    assert_eq!(58, cookies.len());
    assert_eq!(Some(Cookie(1)), cookies.iter().next());
    assert_eq!(Some(Cookie(58)), cookies.iter().next_back());

    cookies.remove(Cookie(30));
    assert!(!cookies.contains(Cookie(30)));
    assert_eq!(57, cookies.iter().count());

    Ok(())
}

#[test]
pub fn test_out_of_range_cookie() -> std::io::Result<()> {
    let mut cookies = CookieSet::new();

    assert!(!cookies.insert(Cookie(Cookie::COUNT as u16)));
    assert!(!cookies.contains(Cookie(u16::MAX)));
    cookies.remove(Cookie(u16::MAX));
    assert!(cookies.is_empty());

    Ok(())
}

#[test]
pub fn test_collect_and_display() -> std::io::Result<()> {
    let cookies: CookieSet = [Cookie(0x11), Cookie(0x10), Cookie(0x11)]
        .into_iter()
        .collect();

    assert_eq!(2, cookies.len());
    assert_eq!("{Cookie(0x10), Cookie(0x11)}", format!("{:?}", cookies));
    assert_eq!("0x10", Cookie(0x10).to_string());
    assert!(Cookie::UNSET.is_unset());

    Ok(())
}
