//! `Date` constructor and `Date.prototype`.
//!
//! Epoch-ms arithmetic is grounded in the teacher's own `native_date.rs`
//! (days-since-epoch civil calendar decomposition), generalized to use the
//! host clock (`std::time::SystemTime`) instead of a stubbed-zero clock,
//! since this engine links `std` rather than targeting a clockless kernel
//! (see `SPEC_FULL.md` §0).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Position;
use crate::signal::Signal;
use crate::terms;
use crate::value::{JsObject, ObjectData, ObjectKind, ObjectRef, PropertyDescriptor, Value};

use super::{arg, define_method, Builtins};

const MS_PER_DAY: i64 = 86_400_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_SECOND: i64 = 1000;

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

fn days_in_month(y: i64, m: i64) -> i64 {
    const DAYS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if m == 1 && is_leap(y) {
        29
    } else {
        DAYS[m as usize]
    }
}

/// `(year, month 0-11, day 1-31, hours, minutes, seconds, millis)` from an
/// epoch-millisecond timestamp, walking whole years then whole months the
/// same way the teacher's `decompose` does, so overflowed components
/// (`new Date(2021, 0, 32)`) fall out of ordinary day arithmetic rather
/// than needing a special overflow case.
fn decompose(ms: f64) -> (i64, i64, i64, i64, i64, i64, i64) {
    let total_ms = ms.floor() as i64;
    let millis = total_ms.rem_euclid(MS_PER_SECOND);
    let total_secs = total_ms.div_euclid(MS_PER_SECOND);
    let secs = total_secs.rem_euclid(60);
    let total_mins = total_secs.div_euclid(60);
    let mins = total_mins.rem_euclid(60);
    let total_hours = total_mins.div_euclid(60);
    let hours = total_hours.rem_euclid(24);
    let mut days = total_hours.div_euclid(24);

    let mut year = 1970i64;
    loop {
        let len = if is_leap(year) { 366 } else { 365 };
        if days >= len {
            days -= len;
            year += 1;
        } else if days < 0 {
            year -= 1;
            days += if is_leap(year) { 366 } else { 365 };
        } else {
            break;
        }
    }
    let mut month = 0i64;
    loop {
        let len = days_in_month(year, month);
        if days >= len {
            days -= len;
            month += 1;
        } else {
            break;
        }
    }
    (year, month, days + 1, hours, mins, secs, millis)
}

/// The inverse of [`decompose`]: normalizes an out-of-range month (via
/// `div_euclid`/`rem_euclid` carrying into the year) before walking whole
/// months, then folds the day/hour/minute/second/ms components in as a
/// flat offset so `setDate(0)` or `new Date(y, 13, 40)` both normalize the
/// way the spec's "Date field normalization" scenario requires.
#[allow(clippy::too_many_arguments)]
fn compose(year: f64, month: f64, day: f64, hours: f64, minutes: f64, seconds: f64, millis: f64) -> f64 {
    if [year, month, day, hours, minutes, seconds, millis].iter().any(|n| !n.is_finite()) {
        return f64::NAN;
    }
    let y = year as i64;
    let m = month as i64;
    let norm_year = y + m.div_euclid(12);
    let norm_month = m.rem_euclid(12);

    let mut total_days: i64 = 0;
    if norm_year >= 1970 {
        for yr in 1970..norm_year {
            total_days += if is_leap(yr) { 366 } else { 365 };
        }
    } else {
        for yr in norm_year..1970 {
            total_days -= if is_leap(yr) { 366 } else { 365 };
        }
    }
    for mo in 0..norm_month {
        total_days += days_in_month(norm_year, mo);
    }
    total_days += day as i64 - 1;

    (total_days * MS_PER_DAY + (hours as i64) * MS_PER_HOUR + (minutes as i64) * MS_PER_MINUTE + (seconds as i64) * MS_PER_SECOND + millis as i64) as f64
}

fn now_ms() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as f64).unwrap_or(0.0)
}

/// A deliberately small ISO-8601 subset parser: `YYYY-MM-DD[THH:MM:SS[.mmm]][Z]`.
/// Anything else (RFC 2822 dates, locale strings) is a `Non-goal`-adjacent
/// gap; callers get `NaN`, matching `Date.parse`'s documented "implementation
/// defined" fallback for unrecognized formats.
fn parse_date_string(s: &str) -> f64 {
    let s = s.trim();
    let bytes = s.as_bytes();
    let mut i = 0;
    let neg = i < bytes.len() && bytes[i] == b'-';
    if neg {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return f64::NAN;
    }
    let mut year: i64 = s[digits_start..i].parse().unwrap_or(0);
    if neg {
        year = -year;
    }
    let mut month = 0i64;
    let mut day = 1i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seconds = 0i64;
    let mut millis = 0i64;

    let read_field = |bytes: &[u8], i: &mut usize| -> Option<i64> {
        let start = *i;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        if *i == start {
            None
        } else {
            std::str::from_utf8(&bytes[start..*i]).ok()?.parse().ok()
        }
    };

    if i < bytes.len() && bytes[i] == b'-' {
        i += 1;
        month = read_field(bytes, &mut i).unwrap_or(1) - 1;
    }
    if i < bytes.len() && bytes[i] == b'-' {
        i += 1;
        day = read_field(bytes, &mut i).unwrap_or(1);
    }
    if i < bytes.len() && (bytes[i] == b'T' || bytes[i] == b' ') {
        i += 1;
        hours = read_field(bytes, &mut i).unwrap_or(0);
        if i < bytes.len() && bytes[i] == b':' {
            i += 1;
            minutes = read_field(bytes, &mut i).unwrap_or(0);
        }
        if i < bytes.len() && bytes[i] == b':' {
            i += 1;
            seconds = read_field(bytes, &mut i).unwrap_or(0);
        }
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            millis = read_field(bytes, &mut i).unwrap_or(0);
        }
    }
    compose(year as f64, month as f64, day as f64, hours as f64, minutes as f64, seconds as f64, millis as f64)
}

fn get_ms(this: &Value) -> f64 {
    match this {
        Value::Object(o) => match &o.borrow().data {
            ObjectData::Date(ms) => *ms,
            _ => f64::NAN,
        },
        _ => f64::NAN,
    }
}

fn set_ms(this: &Value, ms: f64) {
    if let Value::Object(o) = this {
        o.borrow_mut().data = ObjectData::Date(ms);
    }
}

fn make_date(proto: ObjectRef, ms: f64) -> Value {
    let mut obj = JsObject::new(Some(proto));
    obj.kind = ObjectKind::Date;
    obj.data = ObjectData::Date(ms);
    Value::Object(Rc::new(RefCell::new(obj)))
}

/// `String(date)`/template interpolation form — also used by
/// [`crate::evaluator::to_primitive`] for the Date-prefers-string rule.
pub fn to_display_string(ms: f64) -> String {
    if ms.is_nan() {
        return "Invalid Date".to_string();
    }
    let (y, mo, d, h, mi, s, _) = decompose(ms);
    const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    let total_days = (ms / MS_PER_DAY as f64).floor() as i64;
    let dow = (((total_days % 7) + 4).rem_euclid(7)) as usize;
    format!("{} {} {:02} {} {:02}:{:02}:{:02} GMT+0000 (Coordinated Universal Time)", DAYS[dow], MONTHS[mo as usize], d, y, h, mi, s)
}

pub fn constructor(b: &Builtins) -> Value {
    let proto = b.date_proto.clone();
    let proto_for_ctor = proto.clone();
    let ctor = super::native("Date", Some(b.function_proto.clone()), move |ctx, this, args| {
        // Called without `new`: `Date()` returns the current time as a
        // string regardless of arguments (spec §4.6). `construct()` passes
        // `NEW_CALL_SENTINEL` as `this` for every native invoked via `new`;
        // an ordinary call leaves `this` as whatever the call site bound
        // (never that sentinel), which is what this checks for.
        if !matches!(this, Value::Bool(true)) {
            return Ok(Value::string(to_display_string(now_ms())));
        }
        let ms = match args.len() {
            0 => now_ms(),
            1 => match &args[0] {
                Value::Number(n) => *n,
                Value::String(s) => parse_date_string(s),
                Value::Object(o) if o.borrow().kind == ObjectKind::Date => get_ms(&args[0]),
                other => terms::to_number(other),
            },
            _ => {
                let year = terms::to_number(&arg(args, 0));
                let year = if (0.0..=99.0).contains(&year) { year + 1900.0 } else { year };
                compose(
                    year,
                    terms::to_number(&arg(args, 1)),
                    if args.len() > 2 { terms::to_number(&arg(args, 2)) } else { 1.0 },
                    terms::to_number(&arg(args, 3)),
                    terms::to_number(&arg(args, 4)),
                    terms::to_number(&arg(args, 5)),
                    terms::to_number(&arg(args, 6)),
                )
            }
        };
        Ok(make_date(ctx.root.builtins.date_proto.clone(), ms))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto_for_ctor.clone())));
    proto_for_ctor.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));

    define_method(ctor_obj, "now", None, |_ctx, _this, _args| Ok(Value::Number(now_ms())));
    define_method(ctor_obj, "parse", None, |_ctx, _this, args| Ok(Value::Number(parse_date_string(&terms::to_js_string(&arg(args, 0))))));
    define_method(ctor_obj, "UTC", None, |_ctx, _this, args| {
        let year = terms::to_number(&arg(args, 0));
        Ok(Value::Number(compose(
            year,
            terms::to_number(&arg(args, 1)),
            if args.len() > 2 { terms::to_number(&arg(args, 2)) } else { 1.0 },
            terms::to_number(&arg(args, 3)),
            terms::to_number(&arg(args, 4)),
            terms::to_number(&arg(args, 5)),
            terms::to_number(&arg(args, 6)),
        )))
    });

    ctor
}

macro_rules! getter {
    ($proto:expr, $name:expr, $idx:tt) => {
        define_method($proto, $name, None, |_ctx, this, _args| {
            let parts = decompose(get_ms(this));
            Ok(if get_ms(this).is_nan() { Value::Number(f64::NAN) } else { Value::Number(parts.$idx as f64) })
        });
    };
}

pub fn install_prototype(proto: &ObjectRef) {
    getter!(proto, "getFullYear", 0);
    getter!(proto, "getMonth", 1);
    getter!(proto, "getDate", 2);
    getter!(proto, "getHours", 3);
    getter!(proto, "getMinutes", 4);
    getter!(proto, "getSeconds", 5);
    getter!(proto, "getMilliseconds", 6);
    // UTC variants are identical since this engine has no timezone database.
    getter!(proto, "getUTCFullYear", 0);
    getter!(proto, "getUTCMonth", 1);
    getter!(proto, "getUTCDate", 2);
    getter!(proto, "getUTCHours", 3);
    getter!(proto, "getUTCMinutes", 4);
    getter!(proto, "getUTCSeconds", 5);
    getter!(proto, "getUTCMilliseconds", 6);

    define_method(proto, "getDay", None, |_ctx, this, _args| {
        let ms = get_ms(this);
        if ms.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        let total_days = (ms / MS_PER_DAY as f64).floor() as i64;
        Ok(Value::Number((((total_days % 7) + 4).rem_euclid(7)) as f64))
    });
    define_method(proto, "getTime", None, |_ctx, this, _args| Ok(Value::Number(get_ms(this))));
    define_method(proto, "valueOf", None, |_ctx, this, _args| Ok(Value::Number(get_ms(this))));
    define_method(proto, "getTimezoneOffset", None, |_ctx, _this, _args| Ok(Value::Number(0.0)));

    define_method(proto, "setTime", None, |_ctx, this, args| {
        let ms = terms::to_number(&arg(args, 0));
        set_ms(this, ms);
        Ok(Value::Number(ms))
    });

    define_setter(proto, "setFullYear", 0);
    define_setter(proto, "setMonth", 1);
    define_setter(proto, "setDate", 2);
    define_setter(proto, "setHours", 3);
    define_setter(proto, "setMinutes", 4);
    define_setter(proto, "setSeconds", 5);
    define_setter(proto, "setMilliseconds", 6);

    define_method(proto, "toISOString", None, |ctx, this, _args| {
        let ms = get_ms(this);
        if ms.is_nan() {
            return Err(Signal::range_error("Invalid time value", position(ctx)));
        }
        let (y, mo, d, h, mi, s, millis) = decompose(ms);
        Ok(Value::string(format!("{y:04}-{:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{millis:03}Z", mo + 1)))
    });
    define_method(proto, "toJSON", None, |ctx, this, _args| {
        let ms = get_ms(this);
        if ms.is_nan() {
            return Ok(Value::Null);
        }
        let (y, mo, d, h, mi, s, millis) = decompose(ms);
        let _ = ctx;
        Ok(Value::string(format!("{y:04}-{:02}-{d:02}T{h:02}:{mi:02}:{s:02}.{millis:03}Z", mo + 1)))
    });
    define_method(proto, "toUTCString", None, |_ctx, this, _args| {
        let ms = get_ms(this);
        if ms.is_nan() {
            return Ok(Value::string("Invalid Date"));
        }
        let (y, mo, d, h, mi, s, _) = decompose(ms);
        const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
        const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        let total_days = (ms / MS_PER_DAY as f64).floor() as i64;
        let dow = (((total_days % 7) + 4).rem_euclid(7)) as usize;
        Ok(Value::string(format!("{}, {:02} {} {} {:02}:{:02}:{:02} GMT", DAYS[dow], d, MONTHS[mo as usize], y, h, mi, s)))
    });
    define_method(proto, "toString", None, |_ctx, this, _args| Ok(Value::string(to_display_string(get_ms(this)))));
    define_method(proto, "toDateString", None, |_ctx, this, _args| {
        let ms = get_ms(this);
        if ms.is_nan() {
            return Ok(Value::string("Invalid Date"));
        }
        let (y, mo, d, ..) = decompose(ms);
        const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];
        const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        let total_days = (ms / MS_PER_DAY as f64).floor() as i64;
        let dow = (((total_days % 7) + 4).rem_euclid(7)) as usize;
        Ok(Value::string(format!("{} {} {:02} {}", DAYS[dow], MONTHS[mo as usize], d, y)))
    });
}

fn position(ctx: &Rc<crate::context::Context>) -> Position {
    ctx.current_node.get()
}

/// Each `setX` reads every current field, overwrites the one at `idx`
/// with the new argument, then recomposes — this is what makes `setDate`
/// and friends apply the same overflow normalization as the constructor
/// (spec §4.6: "follow overflow rules by normalizing").
fn define_setter(proto: &ObjectRef, name: &'static str, idx: usize) {
    define_method(proto, name, None, move |_ctx, this, args| {
        let (y, mo, d, h, mi, s, ms) = decompose(get_ms(this));
        let mut fields = [y as f64, mo as f64, d as f64, h as f64, mi as f64, s as f64, ms as f64];
        for (i, a) in args.iter().enumerate() {
            if idx + i < fields.len() {
                fields[idx + i] = terms::to_number(a);
            }
        }
        let new_ms = compose(fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6]);
        set_ms(this, new_ms);
        Ok(Value::Number(new_ms))
    });
}
