//! The device's own pages.
//!
//! | pattern                   | method | page                                |
//! |---------------------------|--------|-------------------------------------|
//! | `/test`                   | GET    | form, shows the client IP           |
//! | `/test`                   | POST   | echoes the submitted names, escaped |
//! | `/sensors`                | GET    | current sensor readings             |
//! | `/api/sensors`            | GET    | the same readings as JSON           |
//! | `/status`                 | GET    | network link and board identity     |
//! | `/edit/<index>/abc/<foo>` | GET    | shows captured route arguments      |
//! | `/edit/<index>`           | GET    |                                     |
//! | `/edit`                   | GET    |                                     |

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::devices::{NetworkStatus, Sensor};
use crate::handler::router::{HandlerResult, RouteArgs, RouteError, RouteTable};
use crate::http::encoding::html_escape;
use crate::http::response::ResponseWriter;
use crate::net::connection::Connection;

/// What the pages read from.
pub struct Devices {
    pub sensors: Vec<Arc<dyn Sensor>>,
    pub network: Arc<dyn NetworkStatus>,
    pub board_id: String,
}

#[derive(Serialize)]
struct SensorReading<'a> {
    name: &'a str,
    unit: &'a str,
    value: f64,
    min: f64,
    max: f64,
}

pub fn routes(devices: Arc<Devices>) -> Result<RouteTable, RouteError> {
    let mut table = RouteTable::new();

    let sensors = Arc::clone(&devices);
    let api = Arc::clone(&devices);
    let status = devices;

    table
        .register("/test", "GET", test_form)?
        .register("/test", "POST", test_post)?
        .register("/sensors", "GET", move |_, w, _| sensors_page(&sensors, w))?
        .register("/api/sensors", "GET", move |_, w, _| sensors_json(&api, w))?
        .register("/status", "GET", move |_, w, _| status_page(&status, w))?
        .register("/edit/<index>/abc/<foo>", "GET", edit)?
        .register("/edit/<index>", "GET", edit)?
        .register("/edit", "GET", edit)?;

    Ok(table)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=en>\n\
         \x20   <head>\n\
         \x20       <meta charset=\"UTF-8\" />\n\
         \x20       <title>{title}</title>\n\
         \x20   </head>\n\
         \x20   <body>\n\
         \x20       <h1>{title}</h1>\n\
         {body}\
         \x20   </body>\n\
         </html>\n"
    )
}

fn ok_html(w: &mut ResponseWriter, html: String) -> HandlerResult {
    w.ok(&[], Some("text/html"), Some("UTF-8"), html)?;
    Ok(())
}

fn test_form(conn: &Connection, w: &mut ResponseWriter, _: &RouteArgs) -> HandlerResult {
    let body = format!(
        "        Client IP address = {}\n\
         \x20       <br />\n\
         \x20       <form action=\"/test\" method=\"post\" accept-charset=\"ISO-8859-1\">\n\
         \x20           First name: <input type=\"text\" name=\"firstname\"><br />\n\
         \x20           Last name: <input type=\"text\" name=\"lastname\"><br />\n\
         \x20           <input type=\"submit\" value=\"Submit\">\n\
         \x20       </form>\n",
        conn.ip_addr()
    );
    ok_html(w, page("TEST GET", &body))
}

fn test_post(conn: &Connection, w: &mut ResponseWriter, _: &RouteArgs) -> HandlerResult {
    let form = conn.read_form_data();
    let (Some(firstname), Some(lastname)) = (form.get("firstname"), form.get("lastname")) else {
        w.bad_request()?;
        return Ok(());
    };

    let body = format!(
        "        Firstname = {}<br />\n\
         \x20       Lastname = {}<br />\n",
        html_escape(firstname),
        html_escape(lastname)
    );
    ok_html(w, page("TEST POST", &body))
}

fn sensors_page(devices: &Devices, w: &mut ResponseWriter) -> HandlerResult {
    let mut body = String::new();
    for sensor in &devices.sensors {
        let value = sensor.read();
        writeln!(
            body,
            "        {}: {} {} (min {}, max {})\n        <br />",
            html_escape(sensor.name()),
            value,
            html_escape(sensor.unit()),
            sensor.recorded_min(),
            sensor.recorded_max()
        )?;
    }
    ok_html(w, page("Sensors Page", &body))
}

fn sensors_json(devices: &Devices, w: &mut ResponseWriter) -> HandlerResult {
    let readings: Vec<SensorReading<'_>> = devices
        .sensors
        .iter()
        .map(|sensor| {
            let value = sensor.read();
            SensorReading {
                name: sensor.name(),
                unit: sensor.unit(),
                value,
                min: sensor.recorded_min(),
                max: sensor.recorded_max(),
            }
        })
        .collect();
    w.ok_json(&readings)?;
    Ok(())
}

fn status_page(devices: &Devices, w: &mut ResponseWriter) -> HandlerResult {
    let link = devices.network.status();
    let connection = if link.connected { "Connected" } else { "Not connected" };
    let body = format!(
        "        Microcontroller IP = {}\n        <br />\n\
         \x20       WiFi SSID = {}\n        <br />\n\
         \x20       Connection Status = {}\n        <br />\n\
         \x20       Board Type = {}\n        <br />\n\
         \x20       Board ID = {}\n        <br />\n",
        html_escape(&link.ip_address),
        html_escape(&link.ssid),
        connection,
        env!("CARGO_PKG_NAME"),
        html_escape(&devices.board_id)
    );
    ok_html(w, page("Microserver Status", &body))
}

fn edit(_: &Connection, w: &mut ResponseWriter, args: &RouteArgs) -> HandlerResult {
    let mut body = format!(
        "        <h2>EDIT item with {} variable arguments</h2>\n",
        args.len()
    );
    if let Some(index) = args.get("index") {
        writeln!(body, "        <p>index = {}</p>", html_escape(&index.to_string()))?;
    }
    if let Some(foo) = args.get("foo") {
        writeln!(body, "        <p>foo = {}</p>", html_escape(&foo.to_string()))?;
    }
    ok_html(w, page("TEST EDIT", &body))
}
