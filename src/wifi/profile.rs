use crate::wifi::types::WifiCredentials;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use secrecy::ExposeSecret;
use std::io::Cursor;

/// Render a WLAN profile document for the station credentials.
///
/// The profile is named after the SSID and uses manual connection mode, so the OS never
/// associates behind the supervisor's back.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn create_profile_xml(credentials: &WifiCredentials) -> String {
    let ssid = credentials.ssid();
    let (auth, cipher) = credentials.auth().profile_auth();

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)));

    let mut wlan_profile = BytesStart::new("WLANProfile");
    wlan_profile.push_attribute((
        "xmlns",
        "http://www.microsoft.com/networking/WLAN/profile/v1",
    ));
    let _ = writer.write_event(Event::Start(wlan_profile));

    write_element(&mut writer, "name", ssid);

    let _ = writer.write_event(Event::Start(BytesStart::new("SSIDConfig")));
    let _ = writer.write_event(Event::Start(BytesStart::new("SSID")));
    write_element(&mut writer, "name", ssid);
    let _ = writer.write_event(Event::End(BytesEnd::new("SSID")));
    let _ = writer.write_event(Event::End(BytesEnd::new("SSIDConfig")));

    write_element(&mut writer, "connectionType", "ESS");
    write_element(&mut writer, "connectionMode", "manual");

    let _ = writer.write_event(Event::Start(BytesStart::new("MSM")));
    let _ = writer.write_event(Event::Start(BytesStart::new("security")));
    let _ = writer.write_event(Event::Start(BytesStart::new("authEncryption")));
    write_element(&mut writer, "authentication", auth);
    write_element(&mut writer, "encryption", cipher);
    write_element(&mut writer, "useOneX", "false");
    let _ = writer.write_event(Event::End(BytesEnd::new("authEncryption")));

    if let Some(passphrase) = credentials.passphrase() {
        let _ = writer.write_event(Event::Start(BytesStart::new("sharedKey")));
        write_element(&mut writer, "keyType", "passPhrase");
        write_element(&mut writer, "protected", "false");
        write_element(&mut writer, "keyMaterial", passphrase.expose_secret());
        let _ = writer.write_event(Event::End(BytesEnd::new("sharedKey")));
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("security")));
    let _ = writer.write_event(Event::End(BytesEnd::new("MSM")));
    let _ = writer.write_event(Event::End(BytesEnd::new("WLANProfile")));

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, value: &str) {
    let _ = writer.write_event(Event::Start(BytesStart::new(name)));
    let _ = writer.write_event(Event::Text(BytesText::new(value)));
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}
